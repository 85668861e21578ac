//! Render job handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;
use validator::Validate;

use reel_models::{JobId, JobSnapshot, JobStatus, RenderRequest};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Response for an accepted render job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub status_url: String,
}

/// Accept a render request and start processing it in the background.
pub async fn create_video(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateVideoResponse>)> {
    let Json(request) = payload?;
    request.validate()?;

    let template = request.template.clone();
    let job = state.jobs.create(request).await?;
    metrics::record_job_created(&template);
    info!(
        job_id = %job.id,
        site = %job.request.site,
        slug = %job.request.slug,
        template = %template,
        "Render job accepted"
    );

    state.processor.spawn(job.id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateVideoResponse {
            status_url: format!("/api/videos/{}", job.id),
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// Current status of a render job.
pub async fn get_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job_id = JobId::from_string(job_id);
    let job = state
        .jobs
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))?;

    Ok(Json(job.snapshot()))
}

/// Remove a render job. Deleting an unknown job succeeds.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = JobId::from_string(job_id);
    state.jobs.delete(&job_id).await?;
    info!(job_id = %job_id, "Render job deleted");

    Ok(StatusCode::NO_CONTENT)
}
