//! Structured job logging.

use std::time::Duration;

use tracing::{error, info, warn, Span};

use reel_models::{JobId, JobResult, RecorderProgress, RenderRequest};

/// Logs the lifecycle of one job with its ID and operation attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    /// `operation` names the kind of work, e.g. `render_video`.
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, request: &RenderRequest) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            site = %request.site,
            slug = %request.slug,
            post_type = %request.post_type,
            template = %request.template,
            "Job started"
        );
    }

    /// Logged once per recorder phase, not per frame.
    pub fn log_phase(&self, progress: &RecorderProgress) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            phase = progress.phase.as_str(),
            percent = progress.percent,
            "{}", progress.status_message()
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, result: &JobResult, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            video_url = %result.video_url,
            thumbnail = result.thumbnail_url.is_some(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span carrying the job fields, for instrumenting a whole task.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}
