//! Scripted extraction backend for tests
//!
//! Replays canned tool output instead of running a real binary. `{dir}` in a
//! scripted line is replaced with the invocation's output directory.

use super::{ExitReport, ExtractionBackend, Invocation, OutputLine, PARSER_VERSION, ToolCapabilities};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    /// Output lines in order
    pub lines: Vec<OutputLine>,
    /// Files written (relative to the output dir) before any line is sent
    pub files: Vec<(String, Vec<u8>)>,
    /// Exit status; success when None
    pub exit: Option<ExitReport>,
    /// Fail the precondition check with this reason
    pub missing_tool: Option<String>,
    /// Pause between lines
    pub line_delay: Option<Duration>,
    /// Wait for this notification before exiting
    pub gate: Option<Arc<Notify>>,
    /// Invocations seen by `run`
    pub seen: Mutex<Vec<Invocation>>,
}

impl ScriptedBackend {
    pub(crate) fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines
                .iter()
                .map(|l| OutputLine::Stdout((*l).to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub(crate) fn with_file(mut self, name: &str, contents: &[u8]) -> Self {
        self.files.push((name.to_string(), contents.to_vec()));
        self
    }

    pub(crate) fn with_exit(mut self, exit: ExitReport) -> Self {
        self.exit = Some(exit);
        self
    }

    pub(crate) fn with_stderr(mut self, line: &str) -> Self {
        self.lines.push(OutputLine::Stderr(line.to_string()));
        self
    }

    pub(crate) fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn missing_tool(reason: &str) -> Self {
        Self {
            missing_tool: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    fn preflight(&self, _invocation: &Invocation) -> Result<()> {
        match &self.missing_tool {
            Some(reason) => Err(Error::ToolUnavailable {
                tool: "yt-dlp".into(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn run(
        &self,
        invocation: &Invocation,
        lines: mpsc::Sender<OutputLine>,
    ) -> Result<ExitReport> {
        self.seen.lock().unwrap().push(invocation.clone());

        for (name, contents) in &self.files {
            let path = invocation.output_dir.join(name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, contents).await?;
        }

        let dir = invocation.output_dir.display().to_string();
        for line in &self.lines {
            let line = match line {
                OutputLine::Stdout(l) => OutputLine::Stdout(l.replace("{dir}", &dir)),
                OutputLine::Stderr(l) => OutputLine::Stderr(l.replace("{dir}", &dir)),
            };
            if lines.send(line).await.is_err() {
                break;
            }
            if let Some(delay) = self.line_delay {
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.exit.unwrap_or_else(ExitReport::ok))
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities {
            backend: self.name().into(),
            can_extract: self.missing_tool.is_none(),
            extractor: None,
            js_runtime: None,
            parser_version: PARSER_VERSION,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
