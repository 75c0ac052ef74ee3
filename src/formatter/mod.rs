//! Version formatter
//!
//! Merges an ordered set of source folders (typically `Version_1`,
//! `Version_2`, ...) into one target folder of sequentially numbered,
//! ASCII-safe files:
//!
//! ```text
//! Version_1/b.mp3          001 - a.mp3
//! Version_1/a.mp3    =>    002 - b.mp3
//! Version_2/c.mp3          003 - c.mp3
//! ```
//!
//! Sources are ordered by their version number, files inside a source by
//! [`compare_file_names`]. Indices are gap-free and zero-padded to at least
//! three digits, wider when the last index needs it.
//!
//! The formatter is synchronous and must not run concurrently against the same
//! target folder. Per-file problems are collected in the [`FormatReport`];
//! only batch-level preconditions fail the whole run.

mod ordering;
mod sanitize;

pub use ordering::{compare_file_names, is_serialized_name, version_number};
pub use sanitize::{FALLBACK_NAME, ascii_safe};

use crate::config::{FormatterConfig, TransferMode};
use crate::error::{FormatError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Above this many versions in a range, missing folders are summarized
const MAX_MISSING_WARNINGS: u64 = 1000;

/// Where the source folders come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSelection {
    /// Subfolders of `root` whose name embeds a version in `start..=end`
    VersionRange {
        /// Folder holding the version folders
        root: PathBuf,
        /// First version (at least 1)
        start: u32,
        /// Last version (inclusive)
        end: u32,
    },
    /// Explicit folders, ordered by version number when every name has one
    Explicit(Vec<PathBuf>),
}

/// Parameters of one formatter run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatRequest {
    /// Source folders
    pub sources: SourceSelection,
    /// Target folder (created if missing)
    pub target: PathBuf,
    /// Extensions to include, without the dot; empty includes every file
    pub include_ext: Vec<String>,
    /// Index of the first file
    pub start_index: u32,
    /// Maximum length of the sanitized base name
    pub max_name_len: usize,
    /// Copy or move
    pub transfer: TransferMode,
    /// Remove previously serialized files from the target first
    pub clear_target: bool,
}

impl FormatRequest {
    /// Request built entirely from configured defaults
    pub fn from_config(config: &FormatterConfig) -> Self {
        Self {
            sources: SourceSelection::VersionRange {
                root: config.source_root.clone(),
                start: config.start_version,
                end: config.end_version,
            },
            target: config.target_root.clone(),
            include_ext: config.include_ext.clone(),
            start_index: 1,
            max_name_len: config.max_name_len,
            transfer: config.transfer,
            clear_target: config.clear_target,
        }
    }

    /// Scan `root` for versions `start..=end`, other settings defaulted
    pub fn version_range(root: impl Into<PathBuf>, target: impl Into<PathBuf>, start: u32, end: u32) -> Self {
        let mut request = Self::from_config(&FormatterConfig::default());
        request.sources = SourceSelection::VersionRange {
            root: root.into(),
            start,
            end,
        };
        request.target = target.into();
        request
    }

    /// Use exactly these folders, other settings defaulted
    pub fn explicit(sources: Vec<PathBuf>, target: impl Into<PathBuf>) -> Self {
        let mut request = Self::from_config(&FormatterConfig::default());
        request.sources = SourceSelection::Explicit(sources);
        request.target = target.into();
        request
    }
}

/// Progress of a running format, reported before each file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatProgress {
    /// 1-based position of the file being written
    pub position: usize,
    /// Number of files to write
    pub total: usize,
    /// Target file name
    pub label: String,
}

/// A file written to the target
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormattedFile {
    /// Assigned index
    pub index: u32,
    /// Original file
    #[schema(value_type = String)]
    pub source: PathBuf,
    /// Written file
    #[schema(value_type = String)]
    pub target: PathBuf,
}

/// A file in a source folder that was not considered
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SkippedFile {
    /// The file
    #[schema(value_type = String)]
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: String,
}

/// A file that could not be written
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileFailure {
    /// Index the file would have received
    pub index: u32,
    /// Original file
    #[schema(value_type = String)]
    pub source: PathBuf,
    /// Error message
    pub error: String,
}

/// Summary of a formatter run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormatReport {
    /// Target folder
    #[schema(value_type = String)]
    pub target: PathBuf,
    /// Source folders in the order they were merged
    #[schema(value_type = Vec<String>)]
    pub sources: Vec<PathBuf>,
    /// Files written, in index order
    pub succeeded: Vec<FormattedFile>,
    /// Files not considered (hidden, excluded extension)
    pub skipped: Vec<SkippedFile>,
    /// Files that could not be written
    pub failed: Vec<FileFailure>,
    /// Non-fatal problems (missing versions, unreadable folders)
    pub warnings: Vec<String>,
}

impl FormatReport {
    /// Whether every planned file was written
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Format without progress reporting
///
/// # Errors
///
/// Fails with [`FormatError`] when the version range is invalid, no source
/// folder exists, the indices would not fit in a `u32`, or the target cannot
/// be prepared.
pub fn format_versions(request: &FormatRequest) -> Result<FormatReport> {
    format_versions_with_progress(request, |_| {})
}

/// Format, calling `progress` before each file is written
pub fn format_versions_with_progress<F>(request: &FormatRequest, mut progress: F) -> Result<FormatReport>
where
    F: FnMut(&FormatProgress),
{
    let mut report = FormatReport {
        target: request.target.clone(),
        ..Default::default()
    };

    report.sources = resolve_sources(&request.sources, &mut report.warnings)?;
    ensure_target_is_not_a_source(&request.target, &report.sources)?;

    let allowed = normalize_extensions(&request.include_ext);
    let mut plan = Vec::new();
    for dir in &report.sources {
        match list_files(dir, &allowed, &mut report.skipped) {
            Ok(files) => plan.extend(files),
            Err(e) => report
                .warnings
                .push(format!("cannot read {}: {}", dir.display(), e)),
        }
    }

    let total = plan.len();
    let last_index = u64::from(request.start_index) + total.saturating_sub(1) as u64;
    if last_index > u64::from(u32::MAX) {
        return Err(FormatError::IndexOverflow {
            start_index: request.start_index,
            count: total,
        }
        .into());
    }
    let width = last_index.to_string().len().max(3);

    prepare_target(&request.target, request.clear_target)?;

    for (position, source) in plan.into_iter().enumerate() {
        // Cannot overflow: last_index was checked above
        let index = request.start_index + position as u32;
        let name = target_name(&source, index, width, request.max_name_len);
        let target = request.target.join(&name);

        progress(&FormatProgress {
            position: position + 1,
            total,
            label: name,
        });

        match transfer(&source, &target, request.transfer) {
            Ok(()) => report.succeeded.push(FormattedFile {
                index,
                source,
                target,
            }),
            Err(e) => {
                tracing::warn!(source = ?source, error = %e, "failed to write serialized file");
                report.failed.push(FileFailure {
                    index,
                    source,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        target_dir = ?request.target,
        sources = report.sources.len(),
        succeeded = report.succeeded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "version format complete"
    );
    Ok(report)
}

/// `<index> - <ascii-safe stem><.lowercase ext>`
fn target_name(source: &Path, index: u32, width: usize, max_name_len: usize) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    format!(
        "{:0width$} - {}{}",
        index,
        ascii_safe(&stem, max_name_len),
        ext,
        width = width
    )
}

fn resolve_sources(selection: &SourceSelection, warnings: &mut Vec<String>) -> Result<Vec<PathBuf>> {
    match selection {
        SourceSelection::VersionRange { root, start, end } => {
            if *start < 1 || start > end {
                return Err(FormatError::InvalidRange {
                    start: *start,
                    end: *end,
                }
                .into());
            }

            let no_sources = || FormatError::NoSourceDirectories { root: root.clone() };
            let entries = fs::read_dir(root).map_err(|_| no_sources())?;

            let mut found: Vec<(u32, String, PathBuf)> = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(n) = version_number(&name)
                    && (*start..=*end).contains(&n)
                {
                    found.push((n, name, path));
                }
            }
            found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

            if found.is_empty() {
                return Err(no_sources().into());
            }

            let present: BTreeSet<u32> = found.iter().map(|(n, _, _)| *n).collect();
            let range_len = u64::from(*end - *start) + 1;
            if range_len <= MAX_MISSING_WARNINGS {
                for n in *start..=*end {
                    if !present.contains(&n) {
                        warnings.push(format!("Version_{} not found in {}", n, root.display()));
                    }
                }
            } else {
                let missing = range_len - present.len() as u64;
                warnings.push(format!(
                    "{} versions between {} and {} not found in {}",
                    missing,
                    start,
                    end,
                    root.display()
                ));
            }

            Ok(found.into_iter().map(|(_, _, path)| path).collect())
        }
        SourceSelection::Explicit(paths) => {
            let mut dirs = Vec::new();
            for path in paths {
                if path.is_dir() {
                    dirs.push(path.clone());
                } else {
                    warnings.push(format!("{} is not a directory", path.display()));
                }
            }
            if dirs.is_empty() {
                let root = paths.first().cloned().unwrap_or_default();
                return Err(FormatError::NoSourceDirectories { root }.into());
            }

            let numbers: Option<Vec<u32>> = dirs.iter().map(|d| dir_version(d)).collect();
            if numbers.is_some() {
                dirs.sort_by_key(|d| dir_version(d));
            }
            Ok(dirs)
        }
    }
}

fn dir_version(dir: &Path) -> Option<u32> {
    dir.file_name()
        .and_then(|n| version_number(&n.to_string_lossy()))
}

fn ensure_target_is_not_a_source(target: &Path, sources: &[PathBuf]) -> Result<()> {
    let Ok(target) = target.canonicalize() else {
        return Ok(());
    };
    let clash = sources
        .iter()
        .filter_map(|s| s.canonicalize().ok())
        .any(|s| s == target);
    if clash {
        return Err(FormatError::TargetUnavailable {
            path: target,
            reason: "target is also a source folder".into(),
        }
        .into());
    }
    Ok(())
}

/// Lower-cased extensions without the leading dot
fn normalize_extensions(include_ext: &[String]) -> BTreeSet<String> {
    include_ext
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Qualifying files of one folder in serialization order
fn list_files(
    dir: &Path,
    allowed: &BTreeSet<String>,
    skipped: &mut Vec<SkippedFile>,
) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with('.') {
            skipped.push(SkippedFile {
                path,
                reason: "hidden file".into(),
            });
            continue;
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        let included = allowed.is_empty() || ext.is_some_and(|e| allowed.contains(&e));
        if !included {
            skipped.push(SkippedFile {
                path,
                reason: "extension not included".into(),
            });
            continue;
        }

        files.push((name, path));
    }

    files.sort_by(|a, b| compare_file_names(&a.0, &b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Create the target and deal with earlier output
fn prepare_target(target: &Path, clear: bool) -> Result<()> {
    let unavailable = |e: std::io::Error| FormatError::TargetUnavailable {
        path: target.to_path_buf(),
        reason: e.to_string(),
    };

    fs::create_dir_all(target).map_err(unavailable)?;

    let mut previous = Vec::new();
    for entry in fs::read_dir(target).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;
        let path = entry.path();
        if path.is_file() && is_serialized_name(&entry.file_name().to_string_lossy()) {
            previous.push(path);
        }
    }

    if previous.is_empty() {
        return Ok(());
    }
    if !clear {
        return Err(FormatError::TargetConflict {
            path: target.to_path_buf(),
            count: previous.len(),
        }
        .into());
    }

    for path in &previous {
        fs::remove_file(path).map_err(unavailable)?;
    }
    tracing::debug!(target_dir = ?target, removed = previous.len(), "cleared previous output");
    Ok(())
}

/// Write `target`, which must not exist yet
fn transfer(source: &Path, target: &Path, mode: TransferMode) -> std::io::Result<()> {
    match mode {
        TransferMode::Copy => copy_new(source, target),
        TransferMode::Move => match fs::hard_link(source, target) {
            Ok(()) => fs::remove_file(source),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(e),
            Err(_) => {
                // Different filesystem
                copy_new(source, target)?;
                fs::remove_file(source)
            }
        },
    }
}

fn copy_new(source: &Path, target: &Path) -> std::io::Result<()> {
    let mut input = fs::File::open(source)?;
    let mut output = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)?;
    if let Err(e) = std::io::copy(&mut input, &mut output) {
        drop(output);
        let _ = fs::remove_file(target);
        return Err(e);
    }
    Ok(())
}
