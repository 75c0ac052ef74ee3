//! Job registry
//!
//! The [`JobRegistry`] maps job ids to [`JobEntry`]s. It is an explicit
//! instance owned by the [`JobManager`](crate::JobManager) and lives from
//! startup to shutdown.
//!
//! Each job has exactly one writer: the [`JobHandle`] returned by
//! [`JobRegistry::create`]. Only the handle can publish events or move the
//! job from `running` to `finished`/`failed`, and it does so exactly once
//! because completing consumes the handle.

use crate::bus::{EventBus, Subscription};
use crate::error::{Error, Result};
use crate::types::{DownloadRequest, ErrorKind, Event, JobId, JobInfo, JobStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct JobState {
    status: JobStatus,
    finished_at: Option<DateTime<Utc>>,
    finished_instant: Option<Instant>,
}

/// A job tracked by the registry
pub struct JobEntry {
    id: JobId,
    created_at: DateTime<Utc>,
    request: DownloadRequest,
    bus: EventBus,
    state: Mutex<JobState>,
}

impl JobEntry {
    /// Job ID
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Current status
    pub fn status(&self) -> JobStatus {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).status
    }

    /// The request the job was created from
    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// Attach an observer to this job's event bus
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// The job's event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Snapshot for API consumers
    pub fn info(&self) -> JobInfo {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        JobInfo {
            id: self.id,
            status: state.status,
            created_at: self.created_at,
            finished_at: state.finished_at,
            request: self.request.clone(),
            subscribers: self.bus.subscriber_count(),
        }
    }

    /// Move from `running` to a terminal status
    fn transition(&self, status: JobStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status.is_terminal() {
            return Err(Error::AlreadyTerminal {
                id: self.id,
                status: state.status,
            });
        }
        state.status = status;
        state.finished_at = Some(Utc::now());
        state.finished_instant = Some(Instant::now());
        Ok(())
    }

    /// Whether the job may be removed: terminal, unobserved and past the grace period
    fn is_reapable(&self, grace: Duration) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.finished_instant {
            Some(at) if state.status.is_terminal() => {
                at.elapsed() >= grace && self.bus.subscriber_count() == 0
            }
            _ => false,
        }
    }
}

/// Exclusive write access to one job
///
/// Dropping a handle that never completed fails the job, so observers always
/// see a terminal event.
pub struct JobHandle {
    entry: Arc<JobEntry>,
    completed: bool,
}

impl JobHandle {
    /// Job ID
    pub fn id(&self) -> JobId {
        self.entry.id
    }

    /// The job this handle writes to
    pub fn entry(&self) -> &Arc<JobEntry> {
        &self.entry
    }

    /// Publish a non-terminal event
    ///
    /// Terminal events must go through [`finish`](Self::finish) or
    /// [`fail`](Self::fail); passing one here is ignored.
    pub fn emit(&self, event: Event) {
        if event.is_terminal() {
            tracing::warn!(job_id = %self.entry.id, "terminal event passed to emit, ignoring");
            return;
        }
        self.entry.bus.publish(event);
    }

    /// Mark the job finished and publish `Finished`
    pub fn finish(mut self) -> Result<()> {
        self.complete(JobStatus::Finished, Event::Finished)
    }

    /// Mark the job failed and publish an `Error` event
    pub fn fail(mut self, message: impl Into<String>, kind: ErrorKind) -> Result<()> {
        let event = Event::Error {
            message: message.into(),
            kind,
        };
        self.complete(JobStatus::Failed, event)
    }

    /// Fail the job with the message and classification of `error`
    pub fn fail_with(self, error: &Error) -> Result<()> {
        self.fail(error.to_string(), error.kind())
    }

    fn complete(&mut self, status: JobStatus, event: Event) -> Result<()> {
        self.completed = true;
        // Status first, so an observer that sees the terminal event also sees the status
        self.entry.transition(status)?;
        self.entry.bus.publish(event);
        tracing::info!(job_id = %self.entry.id, %status, "job completed");
        Ok(())
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.completed {
            tracing::error!(job_id = %self.entry.id, "job handle dropped without an outcome");
            let _ = self.complete(
                JobStatus::Failed,
                Event::Error {
                    message: "job ended without reporting an outcome".to_string(),
                    kind: ErrorKind::Extraction,
                },
            );
        }
    }
}

/// Process-wide table of jobs
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    subscriber_capacity: usize,
    backlog_limit: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(
            crate::bus::DEFAULT_SUBSCRIBER_CAPACITY,
            crate::bus::DEFAULT_BACKLOG_LIMIT,
        )
    }
}

impl JobRegistry {
    /// Create an empty registry whose jobs use the given bus settings
    pub fn new(subscriber_capacity: usize, backlog_limit: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            subscriber_capacity,
            backlog_limit,
        }
    }

    /// Register a new running job and return its writer handle
    pub async fn create(&self, request: DownloadRequest) -> JobHandle {
        let entry = Arc::new(JobEntry {
            id: JobId::new(),
            created_at: Utc::now(),
            request,
            bus: EventBus::new(self.subscriber_capacity, self.backlog_limit),
            state: Mutex::new(JobState {
                status: JobStatus::Running,
                finished_at: None,
                finished_instant: None,
            }),
        });

        self.jobs.write().await.insert(entry.id, entry.clone());
        tracing::debug!(job_id = %entry.id, "job registered");

        JobHandle {
            entry,
            completed: false,
        }
    }

    /// Look up a job
    pub async fn get(&self, id: JobId) -> Result<Arc<JobEntry>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::JobNotFound(id))
    }

    /// Subscribe to a job's events
    ///
    /// Works for running and terminal jobs alike: the subscription replays
    /// the retained backlog, which for a terminal job ends with its terminal event.
    pub async fn subscribe(&self, id: JobId) -> Result<Subscription> {
        Ok(self.get(id).await?.subscribe())
    }

    /// Ids of jobs that are still running, oldest first
    pub async fn list_active(&self) -> Vec<JobId> {
        let jobs = self.jobs.read().await;
        let mut active: Vec<&Arc<JobEntry>> = jobs
            .values()
            .filter(|job| job.status() == JobStatus::Running)
            .collect();
        active.sort_by_key(|job| job.created_at);
        active.iter().map(|job| job.id).collect()
    }

    /// Snapshots of every tracked job, oldest first
    pub async fn list(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.read().await;
        let mut infos: Vec<JobInfo> = jobs.values().map(|job| job.info()).collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    /// Number of tracked jobs
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether no jobs are tracked
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Remove terminal jobs that have no observers and finished at least `grace` ago
    ///
    /// The removed jobs' buses are closed, releasing their backlogs.
    pub async fn reap(&self, grace: Duration) -> Vec<JobId> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.is_reapable(grace))
            .map(|job| job.id)
            .collect();

        for id in &expired {
            if let Some(job) = jobs.remove(id) {
                job.bus.close();
            }
            tracing::debug!(job_id = %id, "reaped finished job");
        }
        expired
    }

    /// Remove every job immediately (shutdown)
    ///
    /// Running jobs keep going; their observers keep receiving events through
    /// the subscriptions they already hold.
    pub async fn clear(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let count = jobs.len();
        jobs.clear();
        count
    }
}
