//! Core types for udown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a download job
///
/// Generated when the job is submitted and stable for the job's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a fresh random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The extraction tool is running
    Running,
    /// Completed successfully
    Finished,
    /// Terminated with an error
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (`Finished` or `Failed`)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Quality selection for a download
///
/// Parsed from the user-facing strings `best`, `audio-only` and `<height>p`.
/// Anything else is treated as a raw format selector and passed through.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Quality {
    /// Best mp4 video + m4a audio, falling back to best overall
    #[default]
    Best,
    /// Best audio stream only
    AudioOnly,
    /// Best video no taller than the given height
    MaxHeight(u32),
    /// Raw format selector passed to the tool unchanged
    Custom(String),
}

impl Quality {
    /// The format selection string handed to the extraction tool
    pub fn format_selector(&self) -> String {
        match self {
            Quality::Best => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
            Quality::AudioOnly => "bestaudio/best".to_string(),
            Quality::MaxHeight(h) => format!(
                "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best"
            ),
            Quality::Custom(raw) => raw.clone(),
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let quality = match s.to_ascii_lowercase().as_str() {
            "" | "best" => Quality::Best,
            "audio-only" | "audio" => Quality::AudioOnly,
            lower => match lower.strip_suffix('p').and_then(|h| h.parse::<u32>().ok()) {
                Some(height) if height > 0 => Quality::MaxHeight(height),
                _ => Quality::Custom(s.to_string()),
            },
        };
        Ok(quality)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::AudioOnly => f.write_str("audio-only"),
            Quality::MaxHeight(h) => write!(f, "{h}p"),
            Quality::Custom(raw) => f.write_str(raw),
        }
    }
}

/// Parameters of a download job, as submitted by a caller
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DownloadRequest {
    /// Playlist/video URL or any identifier the extraction tool accepts
    pub source: String,

    /// Quality selector: `best`, `audio-only`, `<height>p` or a raw format string
    #[serde(default)]
    pub quality: Option<String>,

    /// Download audio only (overrides `quality`)
    #[serde(default)]
    pub audio_only: bool,

    /// Extract audio and convert it to mp3 (implies `audio_only`)
    #[serde(default)]
    pub convert_to_mp3: bool,

    /// Output directory (defaults to the configured download directory)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub output_dir: Option<PathBuf>,

    /// Filename template in the extraction tool's syntax
    #[serde(default)]
    pub name_template: Option<String>,

    /// Use serial naming (`01.mp4`, `02.mp4`, ...), ignores `name_template`
    #[serde(default)]
    pub simple_serial: bool,

    /// Cookies file handed to the extraction tool
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub cookies_file: Option<PathBuf>,

    /// Write the tool's metadata JSON next to each download
    #[serde(default)]
    pub save_metadata: bool,

    /// Place downloads in a subdirectory named after the playlist
    /// (defaults to the configured behavior)
    #[serde(default)]
    pub playlist_subdir: Option<bool>,
}

impl DownloadRequest {
    /// Create a request for a source with all other options defaulted
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Effective quality after applying the audio flags
    pub fn effective_quality(&self, default_quality: &str) -> Quality {
        if self.audio_only || self.convert_to_mp3 {
            return Quality::AudioOnly;
        }
        let raw = self.quality.as_deref().unwrap_or(default_quality);
        // Infallible
        raw.parse().unwrap_or_default()
    }
}

/// Snapshot of a job for API consumers
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,
    /// Current status
    pub status: JobStatus,
    /// When the job was submitted
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
    /// The original request
    pub request: DownloadRequest,
    /// Number of observers currently attached
    pub subscribers: usize,
}

/// Classification carried by terminal `Error` events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing external tool or runtime, detected before the tool was started
    Configuration,
    /// The extraction tool failed or produced no usable output
    Extraction,
    /// A filesystem operation failed
    Io,
    /// The request was malformed
    Validation,
}

/// Progress event emitted by a job
///
/// A job emits any number of `Log`, `NewItem` and `Progress` events followed
/// by exactly one terminal event (`Error` or `Finished`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Free-form status text
    Log {
        /// The status line
        line: String,
    },

    /// A new playlist entry started downloading
    NewItem {
        /// Entry title
        title: String,
    },

    /// Download progress of the most recently announced item
    Progress {
        /// Percentage in `[0, 100]`
        percent: f32,
        /// Transfer speed as reported by the tool (e.g. `1.20MiB/s`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        /// Estimated time remaining as reported by the tool (e.g. `00:13`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
    },

    /// The job failed (terminal)
    Error {
        /// Human-readable error message
        message: String,
        /// Error classification
        kind: ErrorKind,
    },

    /// The job completed (terminal)
    Finished,
}

impl Event {
    /// Convenience constructor for a `Log` event
    pub fn log(line: impl Into<String>) -> Self {
        Event::Log { line: line.into() }
    }

    /// `Progress` event carrying only a percentage
    pub fn progress(percent: f32) -> Self {
        Event::Progress {
            percent,
            speed: None,
            eta: None,
        }
    }

    /// Whether this event ends the job's event sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Error { .. } | Event::Finished)
    }

    /// Whether this event may be dropped for a slow subscriber
    pub(crate) fn is_droppable(&self) -> bool {
        matches!(self, Event::Log { .. })
    }

    /// Wire name of this event on the progress stream
    pub fn name(&self) -> &'static str {
        match self {
            Event::Log { .. } => "message",
            Event::NewItem { .. } => "new_video",
            Event::Progress { .. } => "progress",
            Event::Error { .. } => "job_error",
            Event::Finished => "finished",
        }
    }
}
