//! Background job processor.
//!
//! Turns a pending job into a recording, publishes the artifacts and
//! finalizes the job. Every failure ends in a failed job; nothing escapes
//! the task boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::counter;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use reel_media::{move_file, remove_file_if_exists, RecordOutcome, RecordRequest, Recorder};
use reel_models::{JobId, JobResult, JobStatus, JobUpdate};
use reel_storage::ArtifactStore;

use crate::error::{JobsError, JobsResult};
use crate::logging::JobLogger;
use crate::progress::ProgressBridge;
use crate::store::JobStore;
use crate::target::TargetResolver;

const OPERATION: &str = "render_video";
const STARTING_MESSAGE: &str = "Starting recorder";
const UPLOADING_MESSAGE: &str = "Uploading video";
const UPLOADING_PERCENT: u8 = 95;

/// Something that can record a page into a video.
#[async_trait]
pub trait VideoRecorder: Send + Sync {
    async fn record(&self, request: RecordRequest) -> RecordOutcome;
}

#[async_trait]
impl VideoRecorder for Recorder {
    async fn record(&self, request: RecordRequest) -> RecordOutcome {
        Recorder::record(self, request).await
    }
}

/// Processor settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Where recordings are written before publishing
    pub work_dir: PathBuf,
    /// Local fallback artifacts, served under `/videos`
    pub output_dir: PathBuf,
    /// Public origin of this service, for fallback URLs
    pub public_base_url: String,
    /// Base address of the template pages
    pub template_base_url: String,
}

impl ProcessorConfig {
    /// Defaults for a server listening on `port`.
    pub fn for_port(port: u16) -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            output_dir: PathBuf::from("./output"),
            public_base_url: format!("http://localhost:{}", port),
            template_base_url: format!("http://127.0.0.1:{}/templates", port),
        }
    }

    /// Load from environment variables.
    pub fn from_env(port: u16) -> Self {
        let defaults = Self::for_port(port);
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            work_dir: var("WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            output_dir: var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            public_base_url: var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            template_base_url: var("TEMPLATE_BASE_URL").unwrap_or(defaults.template_base_url),
        }
    }
}

/// Runs render jobs as supervised background tasks.
pub struct JobProcessor {
    config: ProcessorConfig,
    store: Arc<dyn JobStore>,
    recorder: Arc<dyn VideoRecorder>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    targets: TargetResolver,
}

impl JobProcessor {
    /// `artifacts` is `None` when no artifact store is configured; results
    /// are then served from `output_dir`.
    pub fn new(
        config: ProcessorConfig,
        store: Arc<dyn JobStore>,
        recorder: Arc<dyn VideoRecorder>,
        artifacts: Option<Arc<dyn ArtifactStore>>,
    ) -> JobsResult<Self> {
        let targets = TargetResolver::new(&config.template_base_url)?;
        Ok(Self {
            config,
            store,
            recorder,
            artifacts,
            targets,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn has_artifact_store(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Process `job_id` in the background.
    ///
    /// The work runs in its own task; if that task panics the job is failed
    /// by the supervising task.
    pub fn spawn(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let processor = Arc::clone(self);
        let span = JobLogger::new(&job_id, OPERATION).span();

        tokio::spawn(
            async move {
                let worker = {
                    let processor = Arc::clone(&processor);
                    let job_id = job_id.clone();
                    tokio::spawn(async move { processor.process(&job_id).await }.in_current_span())
                };

                if let Err(e) = worker.await {
                    let logger = JobLogger::new(&job_id, OPERATION);
                    processor
                        .fail(&job_id, &format!("Job processor crashed: {}", e), &logger)
                        .await;
                }
            }
            .instrument(span),
        )
    }

    /// Process `job_id` to a terminal state.
    pub async fn process(&self, job_id: &JobId) {
        let logger = JobLogger::new(job_id, OPERATION);
        let started = Instant::now();

        let result = match self.run(job_id, &logger).await {
            Ok(result) => result,
            Err(e) => {
                self.fail(job_id, &e.to_string(), &logger).await;
                return;
            }
        };

        match self.store.update(job_id, JobUpdate::completed(result.clone())).await {
            Ok(_) => {
                counter!("reel_jobs_completed_total").increment(1);
                logger.log_completion(&result, started.elapsed());
            }
            Err(e) => {
                self.fail(job_id, &format!("Failed to record completion: {}", e), &logger)
                    .await;
            }
        }
    }

    async fn run(&self, job_id: &JobId, logger: &JobLogger) -> JobsResult<JobResult> {
        let job = self
            .store
            .update(job_id, JobUpdate::processing(STARTING_MESSAGE))
            .await?;
        logger.log_start(&job.request);

        let target = self.targets.resolve(&job.request)?;
        debug!(job_id = %job_id, target = %target, "Resolved render target");

        fs::create_dir_all(&self.config.work_dir).await?;
        let output_path = self.config.work_dir.join(format!("{}.mp4", job_id));

        let bridge = ProgressBridge::spawn(Arc::clone(&self.store), job_id.clone(), logger.clone());
        let request = RecordRequest::new(target, output_path)
            .with_timing(job.request.frame_rate(), job.request.duration_ms())
            .with_progress(bridge.callback());
        let outcome = self.recorder.record(request).await;
        bridge.finish().await;

        if !outcome.success {
            remove_file_if_exists(&outcome.output_path).await;
            let message = outcome
                .error
                .unwrap_or_else(|| "recorder reported failure without a reason".to_string());
            return Err(JobsError::Recording(message));
        }

        self.publish(job_id, &outcome, logger).await
    }

    /// Upload the artifacts, falling back to the local static route.
    async fn publish(
        &self,
        job_id: &JobId,
        outcome: &RecordOutcome,
        logger: &JobLogger,
    ) -> JobsResult<JobResult> {
        if let Some(artifacts) = &self.artifacts {
            self.report(job_id, UPLOADING_MESSAGE, UPLOADING_PERCENT).await;
            match self.upload(artifacts.as_ref(), job_id, outcome, logger).await {
                Ok(result) => return Ok(result),
                Err(e) => logger.log_warning(&format!("Upload failed, serving locally: {}", e)),
            }
        }

        self.publish_locally(job_id, outcome, logger).await
    }

    async fn upload(
        &self,
        artifacts: &dyn ArtifactStore,
        job_id: &JobId,
        outcome: &RecordOutcome,
        logger: &JobLogger,
    ) -> JobsResult<JobResult> {
        let video = fs::read(&outcome.output_path).await?;
        let video_url = artifacts
            .put(video, &format!("videos/{}.mp4", job_id))
            .await?;

        let thumbnail_url = match &outcome.thumbnail_path {
            Some(path) => {
                let name = format!("thumbnails/{}.jpg", job_id);
                match upload_file(artifacts, path, &name).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        logger.log_warning(&format!("Thumbnail upload failed: {}", e));
                        None
                    }
                }
            }
            None => None,
        };

        remove_file_if_exists(&outcome.output_path).await;
        if let Some(path) = &outcome.thumbnail_path {
            remove_file_if_exists(path).await;
        }

        Ok(JobResult {
            video_url,
            thumbnail_url,
        })
    }

    async fn publish_locally(
        &self,
        job_id: &JobId,
        outcome: &RecordOutcome,
        logger: &JobLogger,
    ) -> JobsResult<JobResult> {
        fs::create_dir_all(&self.config.output_dir).await?;

        let video_name = format!("{}.mp4", job_id);
        move_file(&outcome.output_path, self.config.output_dir.join(&video_name)).await?;

        let thumbnail_url = match &outcome.thumbnail_path {
            Some(path) => {
                let name = format!("{}.jpg", job_id);
                match move_file(path, self.config.output_dir.join(&name)).await {
                    Ok(()) => Some(self.local_url(&name)),
                    Err(e) => {
                        logger.log_warning(&format!("Failed to keep thumbnail: {}", e));
                        remove_file_if_exists(path).await;
                        None
                    }
                }
            }
            None => None,
        };

        Ok(JobResult {
            video_url: self.local_url(&video_name),
            thumbnail_url,
        })
    }

    fn local_url(&self, file_name: &str) -> String {
        format!(
            "{}/videos/{}",
            self.config.public_base_url.trim_end_matches('/'),
            file_name
        )
    }

    /// Best-effort progress write.
    async fn report(&self, job_id: &JobId, message: &str, percent: u8) {
        if let Err(e) = self
            .store
            .update(job_id, JobUpdate::progress(message, percent))
            .await
        {
            debug!(job_id = %job_id, "Progress update dropped: {}", e);
        }
    }

    /// Move the job to failed, passing through processing if it never started.
    async fn fail(&self, job_id: &JobId, message: &str, logger: &JobLogger) {
        logger.log_error(message);
        counter!("reel_jobs_failed_total").increment(1);

        match self.store.get(job_id).await {
            Ok(Some(job)) if job.is_terminal() => {
                logger.log_warning(&format!("Job already {}, failure not recorded", job.status));
                return;
            }
            Ok(Some(job)) if job.status == JobStatus::Pending => {
                if let Err(e) = self
                    .store
                    .update(job_id, JobUpdate::processing(STARTING_MESSAGE))
                    .await
                {
                    logger.log_warning(&format!("Failed to mark job processing: {}", e));
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                logger.log_warning("Job no longer exists, failure not recorded");
                return;
            }
            Err(e) => logger.log_warning(&format!("Failed to load job: {}", e)),
        }

        if let Err(e) = self.store.update(job_id, JobUpdate::failed(message)).await {
            logger.log_error(&format!("Failed to record failure: {}", e));
        }
    }
}

async fn upload_file(artifacts: &dyn ArtifactStore, path: &Path, name: &str) -> JobsResult<String> {
    let bytes = fs::read(path).await?;
    Ok(artifacts.put(bytes, name).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_defaults_follow_port() {
        let config = ProcessorConfig::for_port(9000);
        assert_eq!(config.public_base_url, "http://localhost:9000");
        assert_eq!(config.template_base_url, "http://127.0.0.1:9000/templates");
        assert_eq!(config.output_dir, PathBuf::from("./output"));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("PUBLIC_BASE_URL", "https://reel.example.com");
        std::env::set_var("OUTPUT_DIR", "/var/lib/reel/output");
        std::env::set_var("TEMPLATE_BASE_URL", "");
        let config = ProcessorConfig::from_env(8000);
        assert_eq!(config.public_base_url, "https://reel.example.com");
        assert_eq!(config.output_dir, PathBuf::from("/var/lib/reel/output"));
        assert_eq!(config.template_base_url, "http://127.0.0.1:8000/templates");
        std::env::remove_var("PUBLIC_BASE_URL");
        std::env::remove_var("OUTPUT_DIR");
        std::env::remove_var("TEMPLATE_BASE_URL");
    }
}
