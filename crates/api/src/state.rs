//! Application state for the API server.

use medirouter_coordinator::{Coordinator, CoordinatorConfig};
use std::sync::Arc;

/// Shared application state for the API server.
pub struct AppState {
    pub coordinator: Arc<Coordinator>,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the coordinator and all its collaborators from configuration.
    pub fn new(config: CoordinatorConfig) -> medirouter_common::Result<Self> {
        Ok(Self::from_coordinator(Coordinator::from_config(&config)?))
    }

    pub fn from_coordinator(coordinator: Coordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
