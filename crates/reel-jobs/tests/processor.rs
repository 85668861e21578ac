//! End-to-end job processing with a fake recorder and artifact store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use reel_jobs::{JobProcessor, JobStore, MemoryJobStore, ProcessorConfig, VideoRecorder};
use reel_media::{RecordOutcome, RecordRequest};
use reel_models::{JobStatus, RecorderPhase, RecorderProgress, RenderRequest};
use reel_storage::{ArtifactStore, StorageError, StorageResult};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    EncoderFails,
    Panic,
}

struct FakeRecorder {
    behavior: Behavior,
    requests: Mutex<Vec<RecordRequest>>,
}

impl FakeRecorder {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_request(&self) -> RecordRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl VideoRecorder for FakeRecorder {
    async fn record(&self, request: RecordRequest) -> RecordOutcome {
        self.requests.lock().unwrap().push(request.clone());
        let report = |p: RecorderProgress| {
            if let Some(callback) = &request.on_progress {
                callback(p);
            }
        };

        report(RecorderProgress::phase(RecorderPhase::Initializing));
        for index in 0..10 {
            report(RecorderProgress::capturing(index, 10));
        }
        report(RecorderProgress::phase(RecorderPhase::Stitching));

        match self.behavior {
            Behavior::Succeed => {
                let thumbnail = request.output_path.with_extension("jpg");
                tokio::fs::write(&request.output_path, b"mp4 bytes").await.unwrap();
                tokio::fs::write(&thumbnail, b"jpg bytes").await.unwrap();
                report(RecorderProgress::phase(RecorderPhase::Complete));
                RecordOutcome {
                    success: true,
                    output_path: request.output_path.clone(),
                    thumbnail_path: Some(thumbnail),
                    error: None,
                }
            }
            Behavior::EncoderFails => RecordOutcome {
                success: false,
                output_path: request.output_path.clone(),
                thumbnail_path: None,
                error: Some(
                    "FFmpeg failed: exit code 1: Error opening input file frame_%05d.png"
                        .to_string(),
                ),
            },
            Behavior::Panic => panic!("recorder blew up"),
        }
    }
}

#[derive(Default)]
struct FakeArtifacts {
    fail: bool,
    puts: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn put(&self, bytes: Vec<u8>, name: &str) -> StorageResult<String> {
        if self.fail {
            return Err(StorageError::upload_failed("bucket unreachable"));
        }
        self.puts.lock().unwrap().push((name.to_string(), bytes));
        Ok(format!("https://cdn.example.com/{}", name))
    }
}

struct Harness {
    store: Arc<MemoryJobStore>,
    processor: Arc<JobProcessor>,
    work_dir: TempDir,
    output_dir: TempDir,
}

fn harness(recorder: Arc<FakeRecorder>, artifacts: Option<Arc<FakeArtifacts>>) -> Harness {
    let work_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let config = ProcessorConfig {
        work_dir: work_dir.path().to_path_buf(),
        output_dir: output_dir.path().to_path_buf(),
        ..ProcessorConfig::for_port(8000)
    };
    let store = Arc::new(MemoryJobStore::new());
    let artifacts = artifacts.map(|a| a as Arc<dyn ArtifactStore>);
    let processor =
        Arc::new(JobProcessor::new(config, store.clone(), recorder, artifacts).unwrap());

    Harness {
        store,
        processor,
        work_dir,
        output_dir,
    }
}

fn request() -> RenderRequest {
    RenderRequest::new("aje", "x", "post", "default")
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_completes_with_local_fallback_when_store_unconfigured() {
    let recorder = FakeRecorder::new(Behavior::Succeed);
    let h = harness(recorder.clone(), None);
    let job = h.store.create(request()).await.unwrap();

    h.processor.process(&job.id).await;

    let job = h.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent, Some(100));
    assert_eq!(job.progress.as_deref(), Some("Complete"));
    assert!(job.error.is_none());

    let result = job.result.unwrap();
    assert_eq!(
        result.video_url,
        format!("http://localhost:8000/videos/{}.mp4", job.id)
    );
    assert_eq!(
        result.thumbnail_url.as_deref(),
        Some(format!("http://localhost:8000/videos/{}.jpg", job.id).as_str())
    );
    assert!(h.output_dir.path().join(format!("{}.mp4", job.id)).exists());
    assert_eq!(file_count(h.work_dir.path()), 0);

    let recorded = recorder.last_request();
    assert_eq!(
        recorded.target_url,
        "http://127.0.0.1:8000/templates/default/?site=aje&slug=x&postType=post"
    );
    assert_eq!(recorded.frame_rate, 25);
    assert_eq!(recorded.duration_ms, 10_000);
    assert_eq!((recorded.width, recorded.height), (1080, 1920));
}

#[tokio::test]
async fn test_uploads_artifacts_and_discards_local_files() {
    let artifacts = Arc::new(FakeArtifacts::default());
    let h = harness(FakeRecorder::new(Behavior::Succeed), Some(artifacts.clone()));
    let job = h.store.create(request()).await.unwrap();

    h.processor.process(&job.id).await;

    let job = h.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.unwrap();
    assert_eq!(
        result.video_url,
        format!("https://cdn.example.com/videos/{}.mp4", job.id)
    );
    assert_eq!(
        result.thumbnail_url,
        Some(format!("https://cdn.example.com/thumbnails/{}.jpg", job.id))
    );

    let puts = artifacts.puts.lock().unwrap();
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0].1, b"mp4 bytes");
    assert_eq!(file_count(h.work_dir.path()), 0);
    assert_eq!(file_count(h.output_dir.path()), 0);
}

#[tokio::test]
async fn test_upload_failure_falls_back_to_local_route() {
    let artifacts = Arc::new(FakeArtifacts {
        fail: true,
        ..Default::default()
    });
    let h = harness(FakeRecorder::new(Behavior::Succeed), Some(artifacts));
    let job = h.store.create(request()).await.unwrap();

    h.processor.process(&job.id).await;

    let job = h.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job
        .result
        .unwrap()
        .video_url
        .starts_with("http://localhost:8000/videos/"));
    assert_eq!(file_count(h.output_dir.path()), 2);
}

#[tokio::test]
async fn test_encoder_failure_fails_job_with_diagnostics() {
    let h = harness(FakeRecorder::new(Behavior::EncoderFails), None);
    let job = h.store.create(request()).await.unwrap();

    h.processor.process(&job.id).await;

    let job = h.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.is_none());
    let error = job.error.unwrap();
    assert!(error.contains("Error opening input file"), "{}", error);
    assert_eq!(file_count(h.output_dir.path()), 0);
}

#[tokio::test]
async fn test_spawned_job_reaches_terminal_state() {
    let h = harness(FakeRecorder::new(Behavior::Succeed), None);
    let job = h.store.create(request()).await.unwrap();

    let handle = h.processor.spawn(job.id.clone());
    let polled = h.store.get(&job.id).await.unwrap().unwrap();
    assert!(matches!(
        polled.status,
        JobStatus::Pending | JobStatus::Processing | JobStatus::Completed
    ));

    handle.await.unwrap();
    let job = h.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_panicking_recorder_fails_job() {
    let h = harness(FakeRecorder::new(Behavior::Panic), None);
    let job = h.store.create(request()).await.unwrap();

    h.processor.spawn(job.id.clone()).await.unwrap();

    let job = h.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("crashed"));
}

#[tokio::test]
async fn test_unknown_job_is_left_alone() {
    let h = harness(FakeRecorder::new(Behavior::Succeed), None);
    let id = reel_models::JobId::new();

    h.processor.process(&id).await;

    assert!(h.store.get(&id).await.unwrap().is_none());
    assert!(h.store.is_empty().await);
}
