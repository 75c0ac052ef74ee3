//! Error types for udown
//!
//! This module provides the error handling for the library:
//! - A crate-wide [`Error`] covering configuration, validation, extraction and I/O failures
//! - [`FormatError`] for batch-level failures of the version formatter
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::{ErrorKind, JobId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for udown operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for udown
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// A required external tool or runtime could not be located
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable {
        /// Name of the missing tool (e.g., "yt-dlp", "JavaScript runtime")
        tool: String,
        /// Why it is considered unavailable
        reason: String,
    },

    /// The request was rejected before a job was created
    #[error("invalid request: {0}")]
    Validation(String),

    /// The extraction tool failed or produced no usable output
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Version formatter batch-level failure
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job not found in the registry
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// Job status was already terminal
    #[error("job {id} already {status}")]
    AlreadyTerminal {
        /// The job whose status could not change
        id: JobId,
        /// The terminal status it already has
        status: crate::types::JobStatus,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classification of this error when it terminates a job
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } | Error::ToolUnavailable { .. } => ErrorKind::Configuration,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Extraction,
        }
    }
}

/// Version formatter batch-level errors
///
/// Per-file failures never surface here; they are collected in the
/// [`FormatReport`](crate::formatter::FormatReport).
#[derive(Debug, Error)]
pub enum FormatError {
    /// The requested version range is empty or starts below 1
    #[error("invalid version range {start}..={end}")]
    InvalidRange {
        /// First version requested
        start: u32,
        /// Last version requested
        end: u32,
    },

    /// No source directory could be found
    #[error("no source directories found under {root}")]
    NoSourceDirectories {
        /// The scanned root (or the first explicit path)
        root: PathBuf,
    },

    /// The target already holds serialized files and clearing is disabled
    #[error("target {path} already contains {count} numbered file(s)")]
    TargetConflict {
        /// Target directory
        path: PathBuf,
        /// Number of conflicting files
        count: usize,
    },

    /// The last index of the run would not fit in a `u32`
    #[error("{count} file(s) starting at index {start_index} exceed the largest index")]
    IndexOverflow {
        /// Requested first index
        start_index: u32,
        /// Number of files to serialize
        count: usize,
    },

    /// The target directory could not be prepared
    #[error("target {path} is unusable: {reason}")]
    TargetUnavailable {
        /// Target directory
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "job 6f1c... not found",
///     "details": { "job_id": "6f1c..." }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "job_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            // 404 Not Found
            Error::JobNotFound(_) => 404,

            // 409 Conflict
            Error::AlreadyTerminal { .. } => 409,
            Error::Format(FormatError::TargetConflict { .. }) => 409,

            // 422 Unprocessable Entity - Semantic errors
            Error::Format(FormatError::InvalidRange { .. }) => 422,
            Error::Format(FormatError::NoSourceDirectories { .. }) => 422,
            Error::Format(FormatError::IndexOverflow { .. }) => 422,

            // 500 Internal Server Error - Server-side issues
            Error::Format(FormatError::TargetUnavailable { .. }) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - External tool errors
            Error::Extraction(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::ToolUnavailable { .. } => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::ToolUnavailable { .. } => "tool_unavailable",
            Error::Validation(_) => "validation_error",
            Error::Extraction(_) => "extraction_error",
            Error::Format(e) => match e {
                FormatError::InvalidRange { .. } => "invalid_range",
                FormatError::NoSourceDirectories { .. } => "no_source_directories",
                FormatError::TargetConflict { .. } => "target_conflict",
                FormatError::IndexOverflow { .. } => "index_overflow",
                FormatError::TargetUnavailable { .. } => "target_unavailable",
            },
            Error::Io(_) => "io_error",
            Error::JobNotFound(_) => "job_not_found",
            Error::AlreadyTerminal { .. } => "already_terminal",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::JobNotFound(id) => Some(serde_json::json!({
                "job_id": id.to_string(),
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::ToolUnavailable { tool, .. } => Some(serde_json::json!({
                "tool": tool,
            })),
            Error::Format(FormatError::InvalidRange { start, end }) => Some(serde_json::json!({
                "start_version": start,
                "end_version": end,
            })),
            Error::Format(FormatError::NoSourceDirectories { root }) => Some(serde_json::json!({
                "root": root,
            })),
            Error::Format(FormatError::IndexOverflow { start_index, count }) => {
                Some(serde_json::json!({
                    "start_index": start_index,
                    "count": count,
                }))
            }
            Error::Format(FormatError::TargetConflict { path, count }) => {
                Some(serde_json::json!({
                    "path": path,
                    "count": count,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
