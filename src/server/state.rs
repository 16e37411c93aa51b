use std::sync::Arc;

use crate::store::NodeStore;
use crate::worker::{HealthMonitor, WorkerManager};

/// Shared state behind the status API
#[derive(Clone)]
pub struct AppState {
    pub nodes: Arc<dyn NodeStore>,
    pub workers: Arc<WorkerManager>,
    pub health: Option<Arc<HealthMonitor>>,
}

impl AppState {
    pub fn new(nodes: Arc<dyn NodeStore>, workers: Arc<WorkerManager>) -> Self {
        Self {
            nodes,
            workers,
            health: None,
        }
    }

    /// Expose the health monitor's node states
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }
}
