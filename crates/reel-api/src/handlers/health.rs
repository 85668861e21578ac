//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use reel_media::check_ffmpeg;
use reel_models::JobId;

use crate::state::AppState;

const PROBE_JOB_ID: &str = "_health_check";

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub job_store: CheckStatus,
    pub ffmpeg: CheckStatus,
    pub storage: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            detail: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            detail: None,
            latency_ms: None,
        }
    }

    fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: "skipped".to_string(),
            error: None,
            detail: Some(detail.into()),
            latency_ms: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn is_healthy(&self) -> bool {
        self.status != "error"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks the job store round trip, the FFmpeg binary and, when configured, R2.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    // A missing probe document still proves the backend answered
    let job_store_check = {
        let start = Instant::now();
        match state.jobs.get(&JobId::from_string(PROBE_JOB_ID)).await {
            Ok(_) => CheckStatus::ok(start.elapsed().as_millis() as u64)
                .with_detail(state.jobs.backend()),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let ffmpeg_check = {
        let start = Instant::now();
        match check_ffmpeg(&state.ffmpeg_path) {
            Ok(path) => CheckStatus::ok(start.elapsed().as_millis() as u64)
                .with_detail(path.display().to_string()),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let storage_check = match &state.storage {
        Some(storage) => {
            let start = Instant::now();
            match storage.client().check_connectivity().await {
                Ok(()) => CheckStatus::ok(start.elapsed().as_millis() as u64),
                Err(e) => CheckStatus::error(e.to_string()),
            }
        }
        None => CheckStatus::skipped("local fallback"),
    };

    let all_ok =
        job_store_check.is_healthy() && ffmpeg_check.is_healthy() && storage_check.is_healthy();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            job_store: job_store_check,
            ffmpeg: ffmpeg_check,
            storage: storage_check,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
