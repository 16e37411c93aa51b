//! Owns the process's workers and drives their lifecycle together

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use super::{Worker, WorkerError};

/// Every worker that failed to stop, with its error
#[derive(Error, Debug)]
#[error("{} worker(s) failed to stop: {}", .failures.len(), describe(.failures))]
pub struct ManagerError {
    pub failures: Vec<(String, WorkerError)>,
}

fn describe(failures: &[(String, WorkerError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{} ({})", name, err))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One row of the status API's worker listing
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub schedule: String,
    pub completed_runs: u64,
    pub panicked_runs: u64,
}

#[derive(Default)]
pub struct WorkerManager {
    workers: Vec<Arc<dyn Worker>>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, worker: Arc<dyn Worker>) {
        self.workers.push(worker);
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name().to_string()).collect()
    }

    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.workers
            .iter()
            .map(|w| WorkerStatus {
                name: w.name().to_string(),
                schedule: w.describe(),
                completed_runs: w.completed_runs(),
                panicked_runs: w.panicked_runs(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start workers in registration order
    ///
    /// Stops at the first failure and returns it. Workers started before the
    /// failure keep running; call `stop` to bring them down.
    pub async fn start(&self) -> Result<(), WorkerError> {
        for worker in &self.workers {
            worker.start().await.map_err(|e| {
                error!("Failed to start worker {}: {}", worker.name(), e);
                e
            })?;
            info!("Started worker {}", worker.name());
        }
        Ok(())
    }

    /// Stop every worker, newest first, even if some fail
    pub async fn stop(&self) -> Result<(), ManagerError> {
        let mut failures = Vec::new();

        for worker in self.workers.iter().rev() {
            match worker.stop().await {
                Ok(()) => info!("Stopped worker {}", worker.name()),
                Err(e) => {
                    error!("Worker {} failed to stop: {}", worker.name(), e);
                    failures.push((worker.name().to_string(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ManagerError { failures })
        }
    }
}
