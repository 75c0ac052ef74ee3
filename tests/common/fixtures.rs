//! Test fixtures: a fake extraction tool and version folder trees

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::mpsc;
use udown::extractor::{ExitReport, ExtractionBackend, Invocation, OutputLine, PARSER_VERSION};
use udown::{Config, Error, JobManager, Result, ToolCapabilities};

/// One playlist entry the fake tool "downloads"
#[derive(Clone, Debug)]
pub struct FakeItem {
    /// Entry id
    pub id: String,
    /// Entry title, also the file stem
    pub title: String,
    /// File contents written to the output directory
    pub contents: Vec<u8>,
}

impl FakeItem {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            contents: format!("media for {title}").into_bytes(),
        }
    }
}

/// Extraction backend that behaves like yt-dlp with udown's print markers
///
/// For each item it prints the item marker, a few progress lines and the
/// file marker, writing `<title>.mp4` into the invocation's output directory.
#[derive(Clone, Debug, Default)]
pub struct FakeTool {
    /// Entries to produce
    pub items: Vec<FakeItem>,
    /// Exit with this code after printing `error` on stderr
    pub failure: Option<(i32, String)>,
    /// Fail the precondition check
    pub unavailable: bool,
}

impl FakeTool {
    pub fn with_items(items: Vec<FakeItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn failing(code: i32, error: &str) -> Self {
        Self {
            failure: Some((code, error.to_string())),
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExtractionBackend for FakeTool {
    fn preflight(&self, _invocation: &Invocation) -> Result<()> {
        if self.unavailable {
            return Err(Error::ToolUnavailable {
                tool: "yt-dlp".into(),
                reason: "not installed".into(),
            });
        }
        Ok(())
    }

    async fn run(&self, invocation: &Invocation, lines: mpsc::Sender<OutputLine>) -> Result<ExitReport> {
        let send = |line: String| {
            let lines = lines.clone();
            async move { lines.send(OutputLine::Stdout(line)).await.is_ok() }
        };

        send(format!("[youtube:tab] Downloading {} items", self.items.len())).await;
        for item in &self.items {
            let path = invocation.output_dir.join(format!("{}.mp4", item.title));
            send(format!("[udown:item] {} {}", item.id, item.title)).await;
            for percent in ["  0.0%", " 37.5%", "100.0%"] {
                send(format!("[udown:progress] {percent}")).await;
            }
            tokio::fs::write(&path, &item.contents).await?;
            send(format!("[udown:file] {}", path.display())).await;
        }

        match &self.failure {
            Some((code, error)) => {
                let _ = lines.send(OutputLine::Stderr(error.clone())).await;
                Ok(ExitReport::failed(*code))
            }
            None => Ok(ExitReport::ok()),
        }
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities {
            backend: self.name().into(),
            can_extract: !self.unavailable,
            extractor: None,
            js_runtime: None,
            parser_version: PARSER_VERSION,
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Config writing into `dir/downloads` with no playlist subfolder
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.output_dir = dir.path().join("downloads");
    config.download.playlist_subdir = false;
    config
}

/// Manager running jobs with `tool`
pub async fn manager_with(dir: &TempDir, tool: FakeTool) -> JobManager {
    JobManager::with_backend(test_config(dir), std::sync::Arc::new(tool))
        .await
        .unwrap()
}

/// Create `root/<folder>/<file>` for each pair; contents are the file name
pub fn version_tree(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    for (folder, file) in files {
        let folder = root.join(folder);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join(file), file.as_bytes()).unwrap();
    }
    root.to_path_buf()
}

/// Sorted file names in `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
