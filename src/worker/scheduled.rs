//! Runs a `Job` on a `Schedule` as a background task

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::{Job, Schedule, Worker, WorkerError};

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ScheduledWorker<J: Job> {
    job: Arc<J>,
    schedule: Schedule,
    running: Mutex<Option<Running>>,
    counters: Arc<PassCounters>,
}

#[derive(Default)]
struct PassCounters {
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl<J: Job> ScheduledWorker<J> {
    pub fn new(job: J, schedule: Schedule) -> Self {
        Self::from_arc(Arc::new(job), schedule)
    }

    /// Wrap a job that is also referenced elsewhere (e.g. by the status API)
    pub fn from_arc(job: Arc<J>, schedule: Schedule) -> Self {
        Self {
            job,
            schedule,
            running: Mutex::new(None),
            counters: Arc::new(PassCounters::default()),
        }
    }

    pub fn job(&self) -> &Arc<J> {
        &self.job
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn run_loop<J: Job>(
    job: Arc<J>,
    schedule: Schedule,
    counters: Arc<PassCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Worker {} started, running {}", job.name(), schedule);

    let mut ticker = match schedule {
        Schedule::Every(period) => {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(ticker)
        }
        Schedule::Daily { .. } => None,
    };

    loop {
        let wait = async {
            match ticker.as_mut() {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => tokio::time::sleep(schedule.next_delay(Utc::now())).await,
            }
        };

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                break;
            }
            _ = wait => {
                debug!("Worker {} pass starting", job.name());
                // A panicking pass is reported and the schedule carries on
                match AssertUnwindSafe(job.run()).catch_unwind().await {
                    Ok(()) => {
                        counters.completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(payload) => {
                        counters.panicked.fetch_add(1, Ordering::SeqCst);
                        error!(
                            "Worker {} pass panicked: {}",
                            job.name(),
                            panic_message(payload.as_ref())
                        );
                    }
                }
            }
        }
    }

    info!("Worker {} stopped", job.name());
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[async_trait]
impl<J: Job> Worker for ScheduledWorker<J> {
    fn name(&self) -> &str {
        self.job.name()
    }

    async fn start(&self) -> Result<(), WorkerError> {
        self.schedule.validate()?;

        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(WorkerError::AlreadyRunning(self.name().to_string()));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.job),
            self.schedule,
            Arc::clone(&self.counters),
            shutdown_rx,
        ));

        *running = Some(Running { shutdown, handle });
        Ok(())
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        let Some(Running { shutdown, handle }) = self.running.lock().await.take() else {
            return Ok(());
        };

        // The loop may already be gone; the join below reports that
        let _ = shutdown.send(true);

        handle.await.map_err(|e| {
            error!("Worker {} did not exit cleanly: {}", self.name(), e);
            WorkerError::Failed {
                name: self.name().to_string(),
                message: e.to_string(),
            }
        })
    }

    fn describe(&self) -> String {
        self.schedule.to_string()
    }

    fn completed_runs(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    fn panicked_runs(&self) -> u64 {
        self.counters.panicked.load(Ordering::SeqCst)
    }
}


#[cfg(test)]
mod tests {
    use super::test_jobs::CountingJob;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_interval_worker_runs_and_stops() {
        let job = CountingJob::default();
        let passes = Arc::clone(&job.passes);
        let worker = ScheduledWorker::new(job, Schedule::every(Duration::from_millis(10)));

        worker.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        worker.stop().await.unwrap();

        let after_stop = passes.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several passes, got {}", after_stop);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(passes.load(Ordering::SeqCst), after_stop);
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let worker = ScheduledWorker::new(CountingJob::default(), Schedule::every(Duration::from_secs(60)));
        worker.start().await.unwrap();

        let second = worker.start().await;
        assert!(matches!(second, Err(WorkerError::AlreadyRunning(_))));

        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let worker = ScheduledWorker::new(CountingJob::default(), Schedule::daily(3, 0));
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_daily_worker_stops_promptly() {
        let worker = ScheduledWorker::new(CountingJob::default(), Schedule::daily(3, 0));
        worker.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), worker.stop())
            .await
            .expect("stop should not wait for the next daily run")
            .unwrap();
        assert_eq!(worker.completed_runs(), 0);
    }

    #[tokio::test]
    async fn test_invalid_schedule_fails_start() {
        let worker = ScheduledWorker::new(CountingJob::default(), Schedule::every(Duration::ZERO));
        assert!(matches!(
            worker.start().await,
            Err(WorkerError::InvalidSchedule(_))
        ));
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_passes_never_overlap() {
        let job = CountingJob {
            pass_duration: Some(Duration::from_millis(30)),
            ..CountingJob::default()
        };
        let worker = ScheduledWorker::new(job, Schedule::every(Duration::from_millis(5)));

        worker.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.stop().await.unwrap();

        let job = worker.job();
        assert!(job.passes.load(Ordering::SeqCst) >= 2);
        assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(worker.completed_runs(), job.passes.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_pass_does_not_kill_schedule() {
        let job = CountingJob::default();
        job.panic_on_run.store(true, Ordering::SeqCst);
        let passes = Arc::clone(&job.passes);
        let worker = ScheduledWorker::new(job, Schedule::every(Duration::from_millis(5)));

        worker.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(worker.panicked_runs() >= 2);
        assert_eq!(worker.completed_runs(), 0);
        assert!(worker.is_running().await);

        worker.job().panic_on_run.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(passes.load(Ordering::SeqCst) > 0);
        assert!(worker.completed_runs() > 0);
        worker.stop().await.unwrap();
    }
}
