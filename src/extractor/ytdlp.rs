//! yt-dlp backend using the external `yt-dlp` binary

use super::parser::{
    FILE_MARKER, ITEM_MARKER, PARSER_VERSION, PROGRESS_FIELD_SEPARATOR, PROGRESS_MARKER,
};
use super::{ExitReport, ExtractionBackend, Invocation, OutputLine, ToolCapabilities};
use crate::config::{JsRuntimePolicy, ToolsConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// JavaScript runtimes yt-dlp can use, in order of preference
const JS_RUNTIMES: [&str; 3] = ["deno", "node", "bun"];

/// Runs the `yt-dlp` binary
///
/// # Examples
///
/// ```no_run
/// use udown::config::ToolsConfig;
/// use udown::extractor::{ExtractionBackend, YtDlpBackend};
///
/// let backend = YtDlpBackend::from_config(&ToolsConfig::default());
/// println!("yt-dlp found: {}", backend.capabilities().can_extract);
/// ```
pub struct YtDlpBackend {
    binary: Option<PathBuf>,
    js_runtime: Option<PathBuf>,
    js_policy: JsRuntimePolicy,
    challenge_hosts: Vec<String>,
}

impl YtDlpBackend {
    /// Create a backend with an explicit binary path
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary: Some(binary),
            js_runtime: None,
            js_policy: JsRuntimePolicy::Never,
            challenge_hosts: Vec::new(),
        }
    }

    /// Locate the tool and a JavaScript runtime according to `config`
    ///
    /// Explicit paths win; otherwise PATH is searched when `search_path` is set.
    /// A backend whose binary was not found still constructs; its
    /// [`preflight`](ExtractionBackend::preflight) reports the problem.
    pub fn from_config(config: &ToolsConfig) -> Self {
        let binary = config
            .ytdlp_path
            .clone()
            .or_else(|| config.search_path.then(|| which::which("yt-dlp").ok()).flatten());

        let js_runtime = config.js_runtime_path.clone().or_else(|| {
            if !config.search_path {
                return None;
            }
            JS_RUNTIMES
                .iter()
                .find_map(|name| which::which(name).ok())
        });

        tracing::debug!(?binary, ?js_runtime, "resolved extraction tools");

        Self {
            binary,
            js_runtime,
            js_policy: config.js_runtime_policy,
            challenge_hosts: config.challenge_hosts.clone(),
        }
    }

    /// Whether extracting `source` needs a JavaScript runtime
    pub fn requires_js(&self, source: &str) -> bool {
        match self.js_policy {
            JsRuntimePolicy::Always => true,
            JsRuntimePolicy::Never => false,
            JsRuntimePolicy::Auto => challenge_host(source, &self.challenge_hosts).is_some(),
        }
    }

    /// Command-line arguments for one run
    pub fn args(&self, invocation: &Invocation) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--newline",
            "--no-colors",
            "--no-quiet",
            "--progress",
            "--no-simulate",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        args.push("--print".into());
        args.push(format!("before_dl:{} %(id)s %(title)s", ITEM_MARKER).into());
        args.push("--print".into());
        args.push(format!("after_move:{} %(filepath)s", FILE_MARKER).into());
        args.push("--progress-template".into());
        args.push(
            format!(
                "download:{marker} %(progress._percent_str)s{sep}%(progress._speed_str)s{sep}%(progress._eta_str)s",
                marker = PROGRESS_MARKER,
                sep = PROGRESS_FIELD_SEPARATOR,
            )
            .into(),
        );

        args.push("-f".into());
        args.push(invocation.format.clone().into());
        args.push("-P".into());
        args.push(invocation.output_dir.clone().into());
        args.push("-o".into());
        args.push(invocation.template.clone().into());

        if invocation.ignore_item_errors {
            args.push("--ignore-errors".into());
        }
        if invocation.extract_mp3 {
            args.push("-x".into());
            args.push("--audio-format".into());
            args.push("mp3".into());
        }
        if let Some(cookies) = &invocation.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.clone().into());
        }
        if invocation.write_metadata {
            args.push("--write-info-json".into());
        }
        if let Some(runtime) = &self.js_runtime
            && let Some(name) = runtime_name(runtime)
        {
            let mut spec = OsString::from(format!("{}:", name));
            spec.push(runtime);
            args.push("--js-runtimes".into());
            args.push(spec);
        }

        args.push("--".into());
        args.push(invocation.source.clone().into());
        args
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    fn preflight(&self, invocation: &Invocation) -> Result<()> {
        let binary = self.binary.as_ref().ok_or_else(|| Error::ToolUnavailable {
            tool: "yt-dlp".into(),
            reason: "not found in PATH and tools.ytdlp_path is not set".into(),
        })?;
        if !binary.exists() {
            return Err(Error::ToolUnavailable {
                tool: "yt-dlp".into(),
                reason: format!("{} does not exist", binary.display()),
            });
        }

        if self.requires_js(&invocation.source) && self.js_runtime.is_none() {
            let host = challenge_host(&invocation.source, &self.challenge_hosts)
                .unwrap_or_else(|| "this source".to_string());
            return Err(Error::ToolUnavailable {
                tool: "JavaScript runtime".into(),
                reason: format!(
                    "extraction from {} requires one of {}",
                    host,
                    JS_RUNTIMES.join(", ")
                ),
            });
        }
        Ok(())
    }

    async fn run(
        &self,
        invocation: &Invocation,
        lines: mpsc::Sender<OutputLine>,
    ) -> Result<ExitReport> {
        self.preflight(invocation)?;
        let binary = self.binary.as_ref().ok_or_else(|| Error::ToolUnavailable {
            tool: "yt-dlp".into(),
            reason: "not configured".into(),
        })?;

        let mut child = Command::new(binary)
            .args(self.args(invocation))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolUnavailable {
                    tool: "yt-dlp".into(),
                    reason: format!("failed to execute {}: {}", binary.display(), e),
                },
                _ => Error::Io(e),
            })?;

        tracing::debug!(pid = ?child.id(), source = %invocation.source, "started yt-dlp");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("yt-dlp stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Other("yt-dlp stderr was not captured".into()))?;

        let (out, err, status) = tokio::join!(
            forward_lines(stdout, lines.clone(), OutputLine::Stdout),
            forward_lines(stderr, lines, OutputLine::Stderr),
            child.wait()
        );
        out?;
        err?;
        let status = status?;

        Ok(ExitReport {
            success: status.success(),
            code: status.code(),
        })
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities {
            backend: self.name().into(),
            can_extract: self.binary.as_ref().is_some_and(|b| b.exists()),
            extractor: self.binary.clone(),
            js_runtime: self.js_runtime.clone(),
            parser_version: PARSER_VERSION,
        }
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Read `reader` line by line into `lines`, decoding lossily
async fn forward_lines<R>(
    reader: R,
    lines: mpsc::Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        // Keep draining after the receiver is gone so the tool never blocks on a full pipe
        let _ = lines.send(wrap(line)).await;
    }
}

/// The configured challenge host `source` belongs to, if any
fn challenge_host(source: &str, hosts: &[String]) -> Option<String> {
    let url = url::Url::parse(source).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    hosts
        .iter()
        .find(|h| {
            let h = h.to_ascii_lowercase();
            host == h || host.ends_with(&format!(".{}", h))
        })
        .map(|_| host.clone())
}

/// Runtime name yt-dlp expects for `--js-runtimes`
fn runtime_name(path: &Path) -> Option<&'static str> {
    let stem = path.file_stem()?.to_string_lossy().to_ascii_lowercase();
    JS_RUNTIMES.iter().copied().find(|name| stem == *name)
}
