//! Background janitor and shutdown coordination.

use crate::error::Result;
use std::sync::atomic::Ordering;

use super::JobManager;

impl JobManager {
    /// Spawn the task that removes finished, unobserved jobs
    ///
    /// Runs every `jobs.reap_interval` until shutdown.
    pub(crate) fn spawn_janitor(&self) {
        let registry = self.registry.clone();
        let token = self.shutdown_token.clone();
        let interval = self.config.jobs.reap_interval;
        let grace = self.config.jobs.grace_period;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("janitor stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let reaped = registry.reap(grace).await;
                        if !reaped.is_empty() {
                            tracing::debug!(count = reaped.len(), "reaped finished jobs");
                        }
                    }
                }
            }
        });
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called
    pub async fn shutdown_requested(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// Shut the manager down
    ///
    /// 1. Stops accepting new jobs
    /// 2. Stops the janitor
    /// 3. Removes every job from the registry immediately
    ///
    /// Jobs already running are not cancelled: the extraction tool runs to
    /// completion, and observers holding a subscription still receive the
    /// job's remaining events.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        let removed = self.registry.clear().await;
        tracing::info!(removed, "Shutdown complete");
        Ok(())
    }
}
