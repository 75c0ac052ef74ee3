//! Job submission and execution.

use crate::error::{Error, Result};
use crate::extractor::{self, Invocation, relocate};
use crate::registry::JobHandle;
use crate::types::{DownloadRequest, Event, JobId, Quality};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::Ordering;

use super::JobManager;

/// Prefix of per-job staging directories inside the output directory
pub(crate) const STAGING_PREFIX: &str = ".udown-";

/// Template prefix placing each playlist (or single video) in its own folder
const PLAYLIST_DIR_TEMPLATE: &str = "%(playlist_title,title)s";

impl JobManager {
    /// Submit a download and return its job id immediately
    ///
    /// The request is validated synchronously: the source must be non-empty
    /// (and a well-formed URL if it looks like one), the output directory must
    /// be creatable, and a named cookies file must exist. The extraction itself
    /// runs in the background; follow it with [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) was called
    /// - [`Error::Validation`] for a malformed request
    pub async fn submit(&self, request: DownloadRequest) -> Result<JobId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let request = validate_request(request)?;
        let output_dir = request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.config.download.output_dir.clone());

        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            Error::Validation(format!(
                "output directory {} cannot be created: {}",
                output_dir.display(),
                e
            ))
        })?;

        let handle = self.registry.create(request).await;
        let id = handle.id();
        let invocation = self.build_invocation(id, handle.entry().request(), &output_dir);

        tracing::info!(
            job_id = %id,
            source = %invocation.source,
            format = %invocation.format,
            output_dir = ?output_dir,
            "job submitted"
        );

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_job(handle, invocation, output_dir).await;
        });

        Ok(id)
    }

    /// Translate a request into the extraction tool's option set
    pub(crate) fn build_invocation(
        &self,
        id: JobId,
        request: &DownloadRequest,
        output_dir: &Path,
    ) -> Invocation {
        let download = &self.config.download;
        let quality = request.effective_quality(&download.default_quality);

        let base_template = if request.simple_serial {
            download.simple_serial_template.clone()
        } else {
            request
                .name_template
                .clone()
                .unwrap_or_else(|| download.name_template.clone())
        };
        let template = if request.playlist_subdir.unwrap_or(download.playlist_subdir) {
            format!("{}/{}", PLAYLIST_DIR_TEMPLATE, base_template)
        } else {
            base_template
        };

        Invocation {
            source: request.source.clone(),
            format: quality.format_selector(),
            output_dir: output_dir.join(format!("{}{}", STAGING_PREFIX, id)),
            template,
            extract_mp3: request.convert_to_mp3,
            cookies_file: request
                .cookies_file
                .clone()
                .or_else(|| self.config.tools.cookies_file.clone()),
            write_metadata: request.save_metadata,
            ignore_item_errors: self.config.tools.ignore_item_errors,
        }
    }

    /// Body of the per-job task: run, relocate, then report exactly one outcome
    pub(crate) async fn run_job(self, handle: JobHandle, invocation: Invocation, output_dir: PathBuf) {
        let id = handle.id();
        handle.emit(Event::log("Starting download..."));

        match self.execute(&handle, &invocation, &output_dir).await {
            Ok(stored) => {
                handle.emit(Event::log(format!(
                    "Stored {} file(s) in {}",
                    stored.len(),
                    output_dir.display()
                )));
                if let Err(e) = handle.finish() {
                    tracing::error!(job_id = %id, error = %e, "failed to mark job finished");
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, kind = ?e.kind(), "job failed");
                if let Err(e) = handle.fail_with(&e) {
                    tracing::error!(job_id = %id, error = %e, "failed to mark job failed");
                }
            }
        }
    }

    async fn execute(
        &self,
        handle: &JobHandle,
        invocation: &Invocation,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        self.backend.preflight(invocation)?;
        tokio::fs::create_dir_all(&invocation.output_dir).await?;

        let outcome = extractor::drive(self.backend.as_ref(), invocation, handle).await;

        // Completed items are kept even when a later one failed
        let moved = relocate(&invocation.output_dir, output_dir).await;

        let outcome = outcome?;
        let moved = moved?;
        tracing::info!(
            job_id = %handle.id(),
            items = outcome.items,
            files = moved.len(),
            "extraction complete"
        );
        Ok(moved)
    }
}

/// Superficial request checks done before a job exists
pub(crate) fn validate_request(mut request: DownloadRequest) -> Result<DownloadRequest> {
    let source = request.source.trim();
    if source.is_empty() {
        return Err(Error::Validation("source must not be empty".into()));
    }
    if source.contains("://") {
        url::Url::parse(source)
            .map_err(|e| Error::Validation(format!("source is not a valid URL: {}", e)))?;
    }
    request.source = source.to_string();

    if let Some(quality) = &request.quality
        && let Ok(Quality::Custom(raw)) = quality.parse::<Quality>()
        && raw.chars().any(char::is_whitespace)
    {
        return Err(Error::Validation(format!(
            "quality '{}' is not a known preset or format selector",
            raw
        )));
    }

    if let Some(template) = &request.name_template {
        if template.trim().is_empty() {
            return Err(Error::Validation("name_template must not be empty".into()));
        }
        let escapes = Path::new(template)
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(Error::Validation(
                "name_template must stay inside the output directory".into(),
            ));
        }
    }

    if let Some(cookies) = &request.cookies_file
        && !cookies.is_file()
    {
        return Err(Error::Validation(format!(
            "cookies file {} does not exist",
            cookies.display()
        )));
    }

    Ok(request)
}
