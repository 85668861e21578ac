//! Periodic removal of expired terminal jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::JobsResult;
use crate::store::JobStore;

/// Cleanup cadence and retention.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Time between passes
    pub interval: Duration,
    /// Terminal jobs older than this are removed
    pub retention: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retention: Duration::from_secs(86_400),
        }
    }
}

impl CleanupConfig {
    /// Load from `CLEANUP_INTERVAL_SECS` and `JOB_RETENTION_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            interval: secs("CLEANUP_INTERVAL_SECS", defaults.interval),
            retention: secs("JOB_RETENTION_SECS", defaults.retention),
        }
    }
}

/// Removes expired terminal jobs on a timer.
pub struct CleanupScheduler {
    store: Arc<dyn JobStore>,
    config: CleanupConfig,
    started: AtomicBool,
}

/// Keeps the scheduler running; dropping it stops the timer.
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop the timer and wait for it to exit. Passes already running finish on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Cleanup scheduler ended abnormally: {}", e);
        }
    }
}

impl CleanupScheduler {
    pub fn new(store: Arc<dyn JobStore>, config: CleanupConfig) -> Self {
        Self {
            store,
            config,
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Start the timer: one pass now, then one per interval.
    ///
    /// Returns `None` if the scheduler was already started.
    pub fn start(self: &Arc<Self>) -> Option<CleanupHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Cleanup scheduler already started");
            return None;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_secs = self.config.retention.as_secs(),
            "Starting cleanup scheduler"
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_timer(Arc::clone(self), shutdown_rx));
        Some(CleanupHandle { shutdown, task })
    }

    /// Run a single pass and return the number of jobs removed.
    pub async fn run_once(&self) -> JobsResult<usize> {
        let removed = self.store.cleanup(self.config.retention).await?;
        counter!("reel_jobs_cleaned_total").increment(removed as u64);
        Ok(removed)
    }

    async fn run_pass(&self) {
        match self.run_once().await {
            Ok(0) => debug!("Cleanup pass found no expired jobs"),
            Ok(removed) => info!(removed, "Cleanup pass removed expired jobs"),
            Err(e) => warn!("Cleanup pass failed: {}", e),
        }
    }
}

async fn run_timer(scheduler: Arc<CleanupScheduler>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(scheduler.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move { scheduler.run_pass().await });
            }
            _ = shutdown.changed() => {
                info!("Cleanup scheduler stopped");
                break;
            }
        }
    }
}
