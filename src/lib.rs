//! # udown
//!
//! Playlist download jobs with live progress streaming, plus a formatter that
//! serializes version folders into one numbered sequence.
//!
//! ## Components
//!
//! - [`JobManager`] starts one job per [`DownloadRequest`], each running the
//!   external extraction tool (yt-dlp) as its own task
//! - Every job owns an [`EventBus`]; any number of observers subscribe and
//!   receive the job's full event history followed by live events
//! - [`JobRegistry`] tracks jobs from submission until they are reaped
//! - [`api`] binds all of this to HTTP, streaming events as SSE
//! - [`formatter`] merges `Version_<n>` folders into `001 - name.ext` files
//!
//! ## Quick Start
//!
//! ```no_run
//! use udown::{Config, DownloadRequest, Event, JobManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = JobManager::new(Config::default()).await?;
//!
//!     let id = manager
//!         .submit(DownloadRequest::new("https://www.youtube.com/playlist?list=PL123"))
//!         .await?;
//!
//!     let mut events = manager.subscribe(id).await?;
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::NewItem { title } => println!("downloading {title}"),
//!             Event::Progress { percent, .. } => println!("{percent:.1}%"),
//!             other => println!("{:?}", other),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Per-job event broadcast
pub mod bus;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// External extraction tool integration
pub mod extractor;
/// Version folder serialization
pub mod formatter;
/// Job orchestration
pub mod manager;
/// Job table
pub mod registry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use bus::{EventBus, Subscription};
pub use config::{Config, FormatterConfig, TransferMode};
pub use error::{ApiError, Error, ErrorDetail, FormatError, Result, ToHttpStatus};
pub use extractor::{ExtractionBackend, ToolCapabilities, YtDlpBackend};
pub use formatter::{FormatReport, FormatRequest, SourceSelection, format_versions};
pub use manager::JobManager;
pub use registry::{JobHandle, JobRegistry};
pub use types::{DownloadRequest, ErrorKind, Event, JobId, JobInfo, JobStatus, Quality};

/// Run the manager until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use udown::{Config, JobManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = JobManager::new(Config::default()).await?;
///
///     // Serve the API until shutdown, stop on SIGINT/SIGTERM
///     let server = tokio::spawn(udown::api::start_api_server(manager.clone()));
///     run_with_shutdown(manager).await?;
///     server.await??;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: JobManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // May fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
