//! Job orchestration split into focused submodules.
//!
//! The `JobManager` struct and its methods are organized by domain:
//! - [`job`] - Request validation, option translation and the per-job task
//! - [`lifecycle`] - Janitor task and shutdown coordination

mod job;
mod lifecycle;


use crate::bus::Subscription;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::{ExtractionBackend, ToolCapabilities, YtDlpBackend};
use crate::registry::JobRegistry;
use crate::types::{DownloadRequest, JobId, JobInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Main job manager (cloneable - all fields are Arc-wrapped)
///
/// Owns the [`JobRegistry`] for its whole lifetime and runs every submitted
/// job as an independent tokio task.
///
/// # Examples
///
/// ```no_run
/// use udown::{Config, DownloadRequest, JobManager};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = JobManager::new(Config::default()).await?;
/// let id = manager
///     .submit(DownloadRequest::new("https://www.youtube.com/playlist?list=PL123"))
///     .await?;
///
/// let mut events = manager.subscribe(id).await?;
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JobManager {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Table of tracked jobs
    pub(crate) registry: Arc<JobRegistry>,
    /// Extraction backend shared by all jobs (trait object for pluggable implementations)
    pub(crate) backend: Arc<dyn ExtractionBackend>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled on shutdown to stop background tasks
    pub(crate) shutdown_token: CancellationToken,
}

impl JobManager {
    /// Create a manager that runs jobs with yt-dlp, located per `config.tools`
    ///
    /// A missing yt-dlp binary is not an error here; jobs submitted later fail
    /// with a configuration error before anything is spawned.
    pub async fn new(config: Config) -> Result<Self> {
        let backend = YtDlpBackend::from_config(&config.tools);
        let caps = backend.capabilities();
        if caps.can_extract {
            tracing::info!(extractor = ?caps.extractor, js_runtime = ?caps.js_runtime, "extraction tool located");
        } else {
            tracing::warn!("yt-dlp not found, downloads will fail until it is installed or configured");
        }
        Self::with_backend(config, Arc::new(backend)).await
    }

    /// Create a manager with an explicit extraction backend
    pub async fn with_backend(config: Config, backend: Arc<dyn ExtractionBackend>) -> Result<Self> {
        validate_config(&config)?;

        let registry = Arc::new(JobRegistry::new(
            config.jobs.subscriber_capacity,
            config.jobs.backlog_limit,
        ));

        let manager = Self {
            config: Arc::new(config),
            registry,
            backend,
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        };
        manager.spawn_janitor();

        tracing::debug!(backend = manager.backend.name(), "job manager started");
        Ok(manager)
    }

    /// Subscribe to a job's events
    ///
    /// The subscription replays every retained event from the start of the job
    /// and then follows it live until the terminal event.
    pub async fn subscribe(&self, id: JobId) -> Result<Subscription> {
        self.registry.subscribe(id).await
    }

    /// Snapshot of one job
    pub async fn get(&self, id: JobId) -> Result<JobInfo> {
        Ok(self.registry.get(id).await?.info())
    }

    /// Ids of running jobs, oldest first
    pub async fn list_active(&self) -> Vec<JobId> {
        self.registry.list_active().await
    }

    /// Snapshots of every tracked job, oldest first
    pub async fn list(&self) -> Vec<JobInfo> {
        self.registry.list().await
    }

    /// What the extraction backend found on this system
    pub fn capabilities(&self) -> ToolCapabilities {
        self.backend.capabilities()
    }

    /// Active configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The job registry
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}

fn validate_config(config: &Config) -> Result<()> {
    if config.jobs.subscriber_capacity == 0 {
        return Err(Error::Config {
            message: "subscriber_capacity must be at least 1".into(),
            key: Some("jobs.subscriber_capacity".into()),
        });
    }
    if config.jobs.reap_interval.is_zero() {
        return Err(Error::Config {
            message: "reap_interval must be greater than zero".into(),
            key: Some("jobs.reap_interval".into()),
        });
    }
    if config.download.name_template.trim().is_empty() {
        return Err(Error::Config {
            message: "name_template must not be empty".into(),
            key: Some("download.name_template".into()),
        });
    }
    Ok(())
}
