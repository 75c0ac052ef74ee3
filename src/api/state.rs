//! Application state for the API server

use crate::{Config, JobManager};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The job manager
    pub manager: JobManager,

    /// Configuration (same instance the manager runs with)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(manager: JobManager) -> Self {
        let config = manager.config().clone();
        Self { manager, config }
    }
}
