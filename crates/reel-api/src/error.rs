//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use reel_jobs::JobsError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Response extension marking a body that carries internal error details.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InternalErrorDetail;

pub(crate) const INTERNAL_ERROR_DETAIL: &str = "An internal error occurred";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Job error: {0}")]
    Jobs(JobsError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Jobs(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, ApiError::Unavailable(_) | ApiError::Jobs(_))
    }
}

impl From<JobsError> for ApiError {
    fn from(err: JobsError) -> Self {
        match err {
            JobsError::NotFound(id) => ApiError::not_found(format!("Job {} not found", id)),
            JobsError::AlreadyExists(_) | JobsError::Transition(_) => {
                ApiError::Conflict(err.to_string())
            }
            err if err.is_unavailable() => ApiError::Unavailable(err.to_string()),
            err => ApiError::Jobs(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(rejection.body_text()),
            _ => ApiError::BadRequest(rejection.body_text()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut problems: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        problems.sort();
        ApiError::Validation(problems.join("; "))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let internal = self.is_internal();

        let detail = match &self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Validation(msg)
            | ApiError::PayloadTooLarge(msg) => msg.clone(),
            _ => self.to_string(),
        };

        let mut response = (status, Json(ErrorResponse { detail })).into_response();
        if internal {
            response.extensions_mut().insert(InternalErrorDetail);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{JobId, JobStatus, TransitionError};

    #[test]
    fn test_jobs_error_mapping() {
        let err: ApiError = JobsError::NotFound(JobId::from_string("abc")).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = JobsError::Transition(TransitionError::AlreadyTerminal(
            JobStatus::Completed,
        ))
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ApiError = JobsError::persistence("firestore down").into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: ApiError = JobsError::invalid_record("bad status").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
