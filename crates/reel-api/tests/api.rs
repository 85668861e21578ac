//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use reel_api::{create_router, ApiConfig, AppState};
use reel_jobs::{JobProcessor, JobStore, MemoryJobStore, ProcessorConfig, VideoRecorder};
use reel_media::{RecordOutcome, RecordRequest};
use reel_models::{RecorderPhase, RecorderProgress};

/// Writes placeholder artifacts instead of driving a browser.
struct StubRecorder;

#[async_trait]
impl VideoRecorder for StubRecorder {
    async fn record(&self, request: RecordRequest) -> RecordOutcome {
        if let Some(callback) = &request.on_progress {
            callback(RecorderProgress::phase(RecorderPhase::Initializing));
            callback(RecorderProgress::capturing(0, 1));
        }
        let thumbnail = request.output_path.with_extension("jpg");
        tokio::fs::write(&request.output_path, b"mp4 bytes").await.unwrap();
        tokio::fs::write(&thumbnail, b"jpg bytes").await.unwrap();
        RecordOutcome {
            success: true,
            output_path: request.output_path.clone(),
            thumbnail_path: Some(thumbnail),
            error: None,
        }
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryJobStore>,
    _work_dir: TempDir,
    _output_dir: TempDir,
    _template_dir: TempDir,
}

fn test_app_with(configure: impl FnOnce(&mut ApiConfig), ffmpeg_path: PathBuf) -> TestApp {
    let work_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let template_dir = TempDir::new().unwrap();

    let page_dir = template_dir.path().join("default");
    std::fs::create_dir_all(&page_dir).unwrap();
    std::fs::write(page_dir.join("index.html"), "<html>reel template</html>").unwrap();

    let mut config = ApiConfig {
        template_dir: template_dir.path().to_path_buf(),
        rate_limit_rps: 100,
        rate_limit_burst: 100,
        ..ApiConfig::default()
    };
    configure(&mut config);

    let store = Arc::new(MemoryJobStore::new());
    let processor_config = ProcessorConfig {
        work_dir: work_dir.path().to_path_buf(),
        output_dir: output_dir.path().to_path_buf(),
        ..ProcessorConfig::for_port(config.port)
    };
    let processor = JobProcessor::new(
        processor_config,
        store.clone(),
        Arc::new(StubRecorder),
        None,
    )
    .unwrap();

    let state = AppState::new(config, Arc::new(processor), None, ffmpeg_path);

    TestApp {
        router: create_router(state, None),
        store,
        _work_dir: work_dir,
        _output_dir: output_dir,
        _template_dir: template_dir,
    }
}

fn test_app() -> TestApp {
    test_app_with(|_| {}, PathBuf::from("/nonexistent/ffmpeg"))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(router, request).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/videos")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn wait_for_status(router: &Router, status_url: &str, expected: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send_json(router, get(status_url)).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == expected {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached {}", expected);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let (status, headers, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = test_app();
    let request = Request::builder()
        .uri("/healthz")
        .header("X-Request-ID", "req-123")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_ready_degraded_without_ffmpeg() {
    let app = test_app();
    let (status, body) = send_json(&app.router, get("/ready")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["job_store"]["status"], "ok");
    assert_eq!(body["checks"]["ffmpeg"]["status"], "error");
    assert_eq!(body["checks"]["storage"]["status"], "skipped");
}

#[tokio::test]
async fn test_ready_with_ffmpeg_available() {
    // Any executable file satisfies the binary lookup
    let executable = std::env::current_exe().unwrap();
    let app = test_app_with(|_| {}, executable);
    let (status, body) = send_json(&app.router, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_create_video_returns_accepted() {
    let app = test_app();
    let (status, body) = send_json(
        &app.router,
        post_json(r#"{"site":"aje","slug":"my-story","postType":"post"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["jobId"].as_str().unwrap();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["statusUrl"], format!("/api/videos/{}", job_id));

    let stored = app
        .store
        .get(&reel_models::JobId::from_string(job_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.request.template, "default");
}

#[tokio::test]
async fn test_job_completes_and_video_is_served() {
    let app = test_app();
    let (_, created) = send_json(
        &app.router,
        post_json(r#"{"site":"aje","slug":"my-story","postType":"post","template":"default"}"#),
    )
    .await;
    let job_id = created["jobId"].as_str().unwrap().to_string();
    let status_url = created["statusUrl"].as_str().unwrap().to_string();

    let snapshot = wait_for_status(&app.router, &status_url, "completed").await;
    assert_eq!(snapshot["jobId"], job_id.as_str());
    assert_eq!(
        snapshot["url"],
        format!("http://localhost:8000/videos/{}.mp4", job_id)
    );
    assert_eq!(
        snapshot["thumbnailUrl"],
        format!("http://localhost:8000/videos/{}.jpg", job_id)
    );
    assert!(snapshot.get("error").is_none());

    let (status, headers, body) =
        send(&app.router, get(&format!("/videos/{}.mp4", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"mp4 bytes");
    assert_eq!(headers["cross-origin-resource-policy"], "cross-origin");
}

#[tokio::test]
async fn test_create_video_rejects_missing_fields() {
    let app = test_app();
    let (status, body) = send_json(&app.router, post_json(r#"{"site":"aje"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("slug is required"), "{}", detail);
    assert!(detail.contains("postType is required"), "{}", detail);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_create_video_rejects_out_of_range_timing() {
    let app = test_app();
    let (status, body) = send_json(
        &app.router,
        post_json(r#"{"site":"aje","slug":"x","postType":"post","frameRate":120}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("frameRate"));
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_create_video_rejects_malformed_json() {
    let app = test_app();
    let (status, body) = send_json(&app.router, post_json("{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_get_unknown_job_is_not_found() {
    let app = test_app();
    let (status, body) = send_json(&app.router, get("/api/videos/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Job does-not-exist not found");
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let app = test_app();
    let (_, created) = send_json(
        &app.router,
        post_json(r#"{"site":"aje","slug":"x","postType":"post"}"#),
    )
    .await;
    let status_url = created["statusUrl"].as_str().unwrap().to_string();
    wait_for_status(&app.router, &status_url, "completed").await;

    let (first, _, _) = send(&app.router, delete(&status_url)).await;
    let (second, _, _) = send(&app.router, delete(&status_url)).await;
    assert_eq!(first, StatusCode::NO_CONTENT);
    assert_eq!(second, StatusCode::NO_CONTENT);

    let (status, _) = send_json(&app.router, get(&status_url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_job_routes_are_rate_limited_per_client() {
    let app = test_app_with(
        |config| {
            config.rate_limit_rps = 1;
            config.rate_limit_burst = 1;
        },
        PathBuf::from("/nonexistent/ffmpeg"),
    );
    let from = |ip: &str| {
        Request::builder()
            .uri("/api/videos/missing")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    let (first, _, _) = send(&app.router, from("203.0.113.5")).await;
    let (second, headers, _) = send(&app.router, from("203.0.113.5")).await;
    let (other, _, _) = send(&app.router, from("203.0.113.6")).await;

    assert_eq!(first, StatusCode::NOT_FOUND);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["retry-after"], "1");
    assert_eq!(other, StatusCode::NOT_FOUND);

    // Probes are not rate limited
    for _ in 0..3 {
        let (status, _, _) = send(&app.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_template_pages_are_served() {
    let app = test_app();
    let (status, _, body) = send(
        &app.router,
        get("/templates/default/?site=aje&slug=my-story&postType=post"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<html>reel template</html>");
}

#[tokio::test]
async fn test_body_limit() {
    let app = test_app_with(|config| config.max_body_size = 64, PathBuf::from("/nonexistent/ffmpeg"));
    let slug = "x".repeat(200);
    let (status, _, _) = send(
        &app.router,
        post_json(&json!({"site": "aje", "slug": slug, "postType": "post"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.store.is_empty().await);
}
