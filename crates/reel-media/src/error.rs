//! Error types for recording and encoding.

use std::time::Duration;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while recording a template.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("{stage} timed out after {seconds} seconds{context}")]
    Timeout {
        stage: &'static str,
        seconds: u64,
        context: String,
    },

    #[error("Invalid recording request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Wrap any browser driver error.
    pub fn browser(err: impl std::fmt::Display) -> Self {
        Self::Browser(err.to_string())
    }

    /// Create a timeout error for a named stage.
    pub fn timeout(stage: &'static str, limit: Duration) -> Self {
        Self::Timeout {
            stage,
            seconds: limit.as_secs(),
            context: String::new(),
        }
    }

    /// Attach the last uncaught page error to a timeout.
    pub fn with_page_error(self, page_error: Option<String>) -> Self {
        match (self, page_error) {
            (
                Self::Timeout {
                    stage,
                    seconds,
                    context,
                },
                Some(page_error),
            ) => Self::Timeout {
                stage,
                seconds,
                context: format!("{} (last page error: {})", context, page_error),
            },
            (other, _) => other,
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
