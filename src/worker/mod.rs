//! # Background workers
//!
//! Every reconciliation loop implements `Worker`: `start` schedules the loop
//! and returns, `stop` signals it and waits until it has exited. The
//! `WorkerManager` owns an ordered set of workers and drives them together.
//!
//! Most workers are a `Job` (one reconciliation pass) wrapped in a
//! `ScheduledWorker`, which runs the pass on a `Schedule` and never overlaps
//! two passes of the same job.

pub mod expiration;
pub mod health;
pub mod manager;
pub mod notification;
pub mod peer_count;
pub mod provisioning;
pub mod schedule;
pub mod scheduled;

use async_trait::async_trait;
use thiserror::Error;

pub use expiration::ExpirationJob;
pub use health::{
    HealthMonitor, HealthProbe, HealthSnapshot, HttpProbe, NodeHealth, NodeState, ProbeResult,
    Transition,
};
pub use manager::{ManagerError, WorkerManager, WorkerStatus};
pub use notification::NotificationJob;
pub use peer_count::PeerCountJob;
pub use provisioning::ProvisioningJob;
pub use schedule::Schedule;
pub use scheduled::ScheduledWorker;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Worker '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Lifecycle contract shared by all background workers
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Schedule the loop and return without waiting for it
    async fn start(&self) -> Result<(), WorkerError>;

    /// Signal the loop and wait until it has exited
    async fn stop(&self) -> Result<(), WorkerError>;

    /// When the worker runs, for status output
    fn describe(&self) -> String {
        String::new()
    }

    /// Passes completed so far
    fn completed_runs(&self) -> u64 {
        0
    }

    /// Passes that panicked and were skipped
    fn panicked_runs(&self) -> u64 {
        0
    }
}

/// One reconciliation pass
///
/// Errors are handled inside the pass; a failing record must not end it.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(&self);
}
