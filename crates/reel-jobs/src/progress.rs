//! Bridges recorder progress events into job updates.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use reel_media::ProgressCallback;
use reel_models::{JobId, JobUpdate, RecorderPhase, RecorderProgress};

use crate::logging::JobLogger;
use crate::store::JobStore;

/// Forwards recorder progress to the job store without blocking capture.
///
/// Events are coalesced in a latest-value channel and written by a single
/// task, so writes stay ordered and a slow store only drops intermediate
/// events. Write failures are logged and otherwise ignored.
pub struct ProgressBridge {
    tx: watch::Sender<Option<RecorderProgress>>,
    stop: oneshot::Sender<()>,
    writer: JoinHandle<()>,
}

impl ProgressBridge {
    pub fn spawn(store: Arc<dyn JobStore>, job_id: JobId, logger: JobLogger) -> Self {
        let (tx, rx) = watch::channel(None);
        let (stop, stop_rx) = oneshot::channel();
        let writer = tokio::spawn(write_progress(store, job_id, logger, rx, stop_rx));
        Self { tx, stop, writer }
    }

    /// Callback handed to the recorder.
    pub fn callback(&self) -> ProgressCallback {
        let tx = self.tx.clone();
        Arc::new(move |progress: RecorderProgress| {
            // The job's terminal write reports completion.
            if progress.phase != RecorderPhase::Complete {
                tx.send_replace(Some(progress));
            }
        })
    }

    /// Write any pending event and wait for the writer to exit.
    pub async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.writer.await {
            debug!("Progress writer ended abnormally: {}", e);
        }
    }
}

async fn write_progress(
    store: Arc<dyn JobStore>,
    job_id: JobId,
    logger: JobLogger,
    mut rx: watch::Receiver<Option<RecorderProgress>>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut last_phase = None;

    loop {
        let stopping = tokio::select! {
            biased;
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                false
            }
            _ = &mut stop => true,
        };
        if stopping && !rx.has_changed().unwrap_or(false) {
            break;
        }

        let latest = rx.borrow_and_update().clone();
        write_one(store.as_ref(), &job_id, &logger, latest, &mut last_phase).await;
        if stopping {
            break;
        }
    }
}

async fn write_one(
    store: &dyn JobStore,
    job_id: &JobId,
    logger: &JobLogger,
    progress: Option<RecorderProgress>,
    last_phase: &mut Option<RecorderPhase>,
) {
    let Some(progress) = progress else {
        return;
    };

    let message = progress.status_message();
    if *last_phase != Some(progress.phase) {
        logger.log_phase(&progress);
        *last_phase = Some(progress.phase);
    }

    if let Err(e) = store
        .update(job_id, JobUpdate::progress(message, progress.percent))
        .await
    {
        debug!(job_id = %job_id, "Progress update dropped: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryJobStore;
    use reel_models::{JobStatus, RenderRequest};

    async fn processing_job(store: &MemoryJobStore) -> JobId {
        let job = store
            .create(RenderRequest::new("aje", "x", "post", "default"))
            .await
            .unwrap();
        store
            .update(&job.id, JobUpdate::processing("Starting recorder"))
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_latest_progress_is_written_before_finish_returns() {
        let store = Arc::new(MemoryJobStore::new());
        let id = processing_job(&store).await;

        let bridge = ProgressBridge::spawn(
            store.clone(),
            id.clone(),
            JobLogger::new(&id, "render_video"),
        );
        let callback = bridge.callback();
        callback(RecorderProgress::phase(RecorderPhase::Initializing));
        for index in 0..250 {
            callback(RecorderProgress::capturing(index, 250));
        }
        callback(RecorderProgress::phase(RecorderPhase::Thumbnail));
        callback(RecorderProgress::phase(RecorderPhase::Complete));
        bridge.finish().await;

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress.as_deref(), Some("Generating thumbnail"));
        assert_eq!(job.progress_percent, Some(90));
    }

    #[tokio::test]
    async fn test_write_failures_are_swallowed() {
        let store = Arc::new(MemoryJobStore::new());
        let missing = JobId::new();

        let bridge = ProgressBridge::spawn(
            store.clone(),
            missing.clone(),
            JobLogger::new(&missing, "render_video"),
        );
        let callback = bridge.callback();
        callback(RecorderProgress::capturing(3, 10));
        bridge.finish().await;

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_finish_without_events() {
        let store = Arc::new(MemoryJobStore::new());
        let id = processing_job(&store).await;

        let bridge = ProgressBridge::spawn(
            store.clone(),
            id.clone(),
            JobLogger::new(&id, "render_video"),
        );
        bridge.finish().await;

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.progress.as_deref(), Some("Starting recorder"));
    }
}
