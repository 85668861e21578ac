//! Render job record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::job_status::JobStatus;
use crate::request::RenderRequest;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Where the encoded video can be fetched
    pub video_url: String,
    /// Where the thumbnail can be fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Rejected merge of a [`JobUpdate`] into a [`Job`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("job is already {0}")]
    AlreadyTerminal(JobStatus),

    #[error("a result may only be set when completing a job")]
    UnexpectedResult,

    #[error("an error message may only be set when failing a job")]
    UnexpectedError,

    #[error("completing a job requires a result")]
    MissingResult,

    #[error("failing a job requires an error message")]
    MissingError,
}

/// A tracked unit of video generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current status
    pub status: JobStatus,

    /// What to render
    pub request: RenderRequest,

    /// Human readable progress message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,

    /// Overall progress (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,

    /// Output URLs, only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    /// Failure reason, only when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(request: RenderRequest) -> Self {
        Self::with_id(JobId::new(), request, Utc::now())
    }

    /// Create a pending job with a known ID and timestamp.
    pub fn with_id(id: JobId, request: RenderRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            request,
            progress: None,
            progress_percent: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge an update, stamping `updated_at` with the current time.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), TransitionError> {
        self.apply_at(update, Utc::now())
    }

    /// Merge an update at a given instant.
    ///
    /// The record is left untouched when the update is rejected.
    pub fn apply_at(&mut self, update: JobUpdate, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.status));
        }

        let next = update.status.unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        match next {
            JobStatus::Completed if update.result.is_none() => {
                return Err(TransitionError::MissingResult)
            }
            JobStatus::Failed if update.error.is_none() => return Err(TransitionError::MissingError),
            _ => {}
        }
        if update.result.is_some() && next != JobStatus::Completed {
            return Err(TransitionError::UnexpectedResult);
        }
        if update.error.is_some() && next != JobStatus::Failed {
            return Err(TransitionError::UnexpectedError);
        }

        self.status = next;
        if let Some(message) = update.progress {
            self.progress = Some(message);
        }
        if let Some(percent) = update.progress_percent {
            let percent = percent.min(100);
            self.progress_percent = Some(match self.progress_percent {
                Some(current) => current.max(percent),
                None => percent,
            });
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        self.updated_at = now.max(self.updated_at);

        Ok(())
    }

    /// Polling view of the job.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress.clone(),
            progress_percent: self.progress_percent,
            url: self.result.as_ref().map(|r| r.video_url.clone()),
            thumbnail_url: self.result.as_ref().and_then(|r| r.thumbnail_url.clone()),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Partial set of fields to merge into a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobUpdate {
    /// Move a pending job into processing.
    pub fn processing(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(message.into()),
            progress_percent: Some(0),
            ..Default::default()
        }
    }

    /// Progress message and percentage, status unchanged.
    pub fn progress(message: impl Into<String>, percent: u8) -> Self {
        Self {
            progress: Some(message.into()),
            progress_percent: Some(percent),
            ..Default::default()
        }
    }

    /// Complete the job with its output URLs.
    pub fn completed(result: JobResult) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some("Complete".to_string()),
            progress_percent: Some(100),
            result: Some(result),
            error: None,
        }
    }

    /// Fail the job with a reason.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Names of the fields this update touches (`updatedAt` is always implied).
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.status.is_some() {
            names.push("status");
        }
        if self.progress.is_some() {
            names.push("progress");
        }
        if self.progress_percent.is_some() {
            names.push("progress_percent");
        }
        if self.result.is_some() {
            names.push("result");
        }
        if self.error.is_some() {
            names.push("error");
        }
        names
    }
}

/// Status snapshot returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
