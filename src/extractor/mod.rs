//! Extraction adapter
//!
//! Everything that touches the external extraction tool lives here. The core
//! abstraction is the [`ExtractionBackend`] trait: it checks preconditions and
//! runs the tool, streaming raw output lines. [`drive`] feeds those lines
//! through the versioned [`OutputParser`] into a job's event bus and decides
//! the outcome once the tool exits.
//!
//! - [`YtDlpBackend`]: runs the `yt-dlp` binary
//! - [`UnavailableBackend`]: stand-in when no tool could be located
//!
//! Completed files are written to a per-job staging directory and moved into
//! the output directory by [`relocate`] without overwriting existing files.

mod parser;
mod relocate;
mod ytdlp;

pub use parser::{OutputParser, PARSER_VERSION, parse_percent};
pub use relocate::relocate;
pub use ytdlp::YtDlpBackend;

use crate::error::{Error, Result};
use crate::registry::JobHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use utoipa::ToSchema;

/// Buffered output lines between the tool reader and the parser
const LINE_BUFFER: usize = 256;

/// Translated options for one run of the extraction tool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Source URL or playlist identifier
    pub source: String,
    /// Format selector in the tool's syntax
    pub format: String,
    /// Directory the tool writes into (the job's staging area)
    pub output_dir: PathBuf,
    /// Output filename template
    pub template: String,
    /// Extract the audio track and convert it to mp3
    pub extract_mp3: bool,
    /// Cookies file passed to the tool
    pub cookies_file: Option<PathBuf>,
    /// Write a metadata JSON file next to each download
    pub write_metadata: bool,
    /// Continue with the next entry when one fails
    pub ignore_item_errors: bool,
}

/// One raw line of tool output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputLine {
    /// Line read from standard output
    Stdout(String),
    /// Line read from standard error
    Stderr(String),
}

/// How the tool process ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitReport {
    /// Whether the process exited with status 0
    pub success: bool,
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl ExitReport {
    /// Successful exit
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    /// Exit with a non-zero code
    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
        }
    }
}

/// What an extraction backend found on this system
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolCapabilities {
    /// Backend name
    pub backend: String,
    /// Whether downloads can run at all
    pub can_extract: bool,
    /// Located extraction tool
    #[schema(value_type = Option<String>)]
    pub extractor: Option<PathBuf>,
    /// Located JavaScript runtime
    #[schema(value_type = Option<String>)]
    pub js_runtime: Option<PathBuf>,
    /// Version of the output parser
    pub parser_version: u32,
}

/// Runs the external extraction tool
///
/// Implementations must send every output line through `lines` in the order
/// the tool produced it and return once the process has exited.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Check that the tool (and any runtime it needs for this source) exists
    ///
    /// Called before anything is spawned; failures are configuration errors.
    fn preflight(&self, invocation: &Invocation) -> Result<()>;

    /// Run the tool to completion, streaming its output
    async fn run(
        &self,
        invocation: &Invocation,
        lines: mpsc::Sender<OutputLine>,
    ) -> Result<ExitReport>;

    /// Query what this backend can do
    fn capabilities(&self) -> ToolCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Backend used when no extraction tool could be located
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    /// Create a backend that rejects every job with `reason`
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ExtractionBackend for UnavailableBackend {
    fn preflight(&self, _invocation: &Invocation) -> Result<()> {
        Err(Error::ToolUnavailable {
            tool: "yt-dlp".into(),
            reason: self.reason.clone(),
        })
    }

    async fn run(
        &self,
        invocation: &Invocation,
        _lines: mpsc::Sender<OutputLine>,
    ) -> Result<ExitReport> {
        self.preflight(invocation).map(|_| ExitReport::failed(127))
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities {
            backend: self.name().into(),
            can_extract: false,
            extractor: None,
            js_runtime: None,
            parser_version: PARSER_VERSION,
        }
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Result of a successful extraction run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Distinct items announced by the tool
    pub items: usize,
    /// Final paths the tool reported, inside the staging directory
    pub files: Vec<PathBuf>,
}

/// Run `backend` and translate its output into events on `handle`
///
/// Events are emitted as lines arrive. Returns an error when the tool exits
/// abnormally, or when it reports success but a file it announced is missing
/// or empty. A run that announced no items at all is a success.
pub async fn drive(
    backend: &dyn ExtractionBackend,
    invocation: &Invocation,
    handle: &JobHandle,
) -> Result<Outcome> {
    let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
    let mut parser = OutputParser::new();

    let consume = async {
        while let Some(line) = rx.recv().await {
            for event in parser.feed(&line) {
                handle.emit(event);
            }
        }
    };
    let (exit, ()) = tokio::join!(backend.run(invocation, tx), consume);
    let exit = exit?;

    if !exit.success {
        tracing::warn!(
            job_id = %handle.id(),
            backend = backend.name(),
            code = ?exit.code,
            "extraction tool exited abnormally"
        );
        return Err(Error::Extraction(parser.failure_message(exit.code)));
    }

    let mut files = Vec::with_capacity(parser.reported_files().len());
    for reported in parser.reported_files() {
        let path = if reported.is_absolute() {
            reported.clone()
        } else {
            invocation.output_dir.join(reported)
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => files.push(path),
            Ok(_) => {
                return Err(Error::Extraction(format!(
                    "{} is empty after a reported success",
                    path.display()
                )));
            }
            Err(_) => {
                return Err(Error::Extraction(format!(
                    "{} is missing after a reported success",
                    path.display()
                )));
            }
        }
    }

    Ok(Outcome {
        items: parser.items_seen(),
        files,
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
