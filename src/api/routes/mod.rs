//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] — Job submission, lookup and event streams
//! - [`format`] — Version formatter
//! - [`system`] — Health, capabilities, OpenAPI

use crate::config::{FormatterConfig, TransferMode};
use crate::formatter::{FormatRequest, SourceSelection};
use crate::types::JobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod format;
mod jobs;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use format::*;
pub use jobs::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Response for POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitResponse {
    /// Id of the started job
    pub job_id: JobId,
}

/// Request body for POST /format
///
/// Every field is optional; missing fields fall back to the configured
/// formatter defaults. When `sources` is given it replaces the version scan.
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct FormatBody {
    /// Folder holding the `Version_<n>` folders
    #[schema(value_type = Option<String>)]
    pub source_root: Option<PathBuf>,
    /// Explicit source folders (overrides the version scan)
    #[schema(value_type = Option<Vec<String>>)]
    pub sources: Option<Vec<PathBuf>>,
    /// Target folder
    #[schema(value_type = Option<String>)]
    pub target_root: Option<PathBuf>,
    /// First version folder
    pub start_version: Option<u32>,
    /// Last version folder
    pub end_version: Option<u32>,
    /// Extensions to include; empty includes every file
    pub include_ext: Option<Vec<String>>,
    /// Index of the first file (default: 1)
    pub start_index: Option<u32>,
    /// Maximum length of the sanitized base name
    pub max_name_len: Option<usize>,
    /// Copy or move
    pub transfer: Option<TransferMode>,
    /// Remove earlier serialized files from the target first
    pub clear_target: Option<bool>,
}

impl FormatBody {
    /// Merge with configured defaults
    pub fn into_request(self, defaults: &FormatterConfig) -> FormatRequest {
        let mut request = FormatRequest::from_config(defaults);

        request.sources = match self.sources {
            Some(sources) => SourceSelection::Explicit(sources),
            None => SourceSelection::VersionRange {
                root: self.source_root.unwrap_or_else(|| defaults.source_root.clone()),
                start: self.start_version.unwrap_or(defaults.start_version),
                end: self.end_version.unwrap_or(defaults.end_version),
            },
        };
        if let Some(target) = self.target_root {
            request.target = target;
        }
        if let Some(include_ext) = self.include_ext {
            request.include_ext = include_ext;
        }
        if let Some(start_index) = self.start_index {
            request.start_index = start_index;
        }
        if let Some(max_name_len) = self.max_name_len {
            request.max_name_len = max_name_len;
        }
        if let Some(transfer) = self.transfer {
            request.transfer = transfer;
        }
        if let Some(clear_target) = self.clear_target {
            request.clear_target = clear_target;
        }
        request
    }
}
