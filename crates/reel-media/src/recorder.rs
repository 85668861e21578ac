//! Frame capture engine.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info, warn};

use reel_models::encoding::{DEFAULT_DURATION_MS, DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use reel_models::{RecorderPhase, RecorderProgress};

use crate::animation::AnimationControl;
use crate::browser::{BrowserLauncher, BrowserSession, Viewport, FONTS_READY_SCRIPT};
use crate::chromium::ChromiumLauncher;
use crate::encode::{EncoderConfig, FfmpegEncoder, FrameEncoder, FrameSequence};
use crate::error::{MediaError, MediaResult};
use crate::schedule::FrameSchedule;

/// Receives progress events. Called inline from the capture loop, so it must not block.
pub type ProgressCallback = Arc<dyn Fn(RecorderProgress) + Send + Sync>;

/// Recorder settings.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Parent directory for per-recording scratch directories
    pub work_dir: PathBuf,
    /// Browser executable override
    pub chrome_executable: Option<PathBuf>,
    pub launch_timeout: Duration,
    pub navigation_timeout: Duration,
    pub ready_timeout: Duration,
    /// Pause after fonts are ready, before the first frame
    pub font_settle: Duration,
    pub encoder: EncoderConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            chrome_executable: None,
            launch_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(30),
            font_settle: Duration::from_millis(250),
            encoder: EncoderConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().map(PathBuf::from),
            launch_timeout: secs("BROWSER_LAUNCH_TIMEOUT_SECS", defaults.launch_timeout),
            navigation_timeout: secs("NAVIGATION_TIMEOUT_SECS", defaults.navigation_timeout),
            ready_timeout: secs("READY_TIMEOUT_SECS", defaults.ready_timeout),
            font_settle: std::env::var("FONT_SETTLE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.font_settle),
            encoder: EncoderConfig::from_env(),
        }
    }
}

/// What to record.
#[derive(Clone)]
pub struct RecordRequest {
    pub target_url: String,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub duration_ms: u64,
    pub on_progress: Option<ProgressCallback>,
}

impl RecordRequest {
    /// Request with the default 1080x1920, 25 fps, 10 second recording.
    pub fn new(target_url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            target_url: target_url.into(),
            output_path: output_path.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            duration_ms: DEFAULT_DURATION_MS,
            on_progress: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_timing(mut self, frame_rate: u32, duration_ms: u64) -> Self {
        self.frame_rate = frame_rate;
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Reject inputs the capture loop or yuv420p output cannot handle.
    pub fn validate(&self) -> MediaResult<()> {
        if self.target_url.trim().is_empty() {
            return Err(MediaError::invalid_request("target URL must not be empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::invalid_request("width/height must be non-zero"));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(MediaError::invalid_request(
                "width/height must be even (required for yuv420p output)",
            ));
        }
        FrameSchedule::new(self.duration_ms, self.frame_rate)?;
        Ok(())
    }

    fn report(&self, progress: RecorderProgress) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

impl std::fmt::Debug for RecordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRequest")
            .field("target_url", &self.target_url)
            .field("output_path", &self.output_path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_rate", &self.frame_rate)
            .field("duration_ms", &self.duration_ms)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Result of a recording. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub success: bool,
    pub output_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl RecordOutcome {
    fn succeeded(output_path: PathBuf, thumbnail_path: Option<PathBuf>) -> Self {
        Self {
            success: true,
            output_path,
            thumbnail_path,
            error: None,
        }
    }

    fn failed(output_path: PathBuf, error: &MediaError) -> Self {
        Self {
            success: false,
            output_path,
            thumbnail_path: None,
            error: Some(error.to_string()),
        }
    }
}

/// Records a page into a video, one isolated browser per call.
#[derive(Clone)]
pub struct Recorder {
    config: RecorderConfig,
    launcher: Arc<dyn BrowserLauncher>,
    encoder: Arc<dyn FrameEncoder>,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        launcher: Arc<dyn BrowserLauncher>,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Self {
        Self {
            config,
            launcher,
            encoder,
        }
    }

    /// Headless Chromium + FFmpeg recorder.
    pub fn from_config(config: RecorderConfig) -> Self {
        let launcher = Arc::new(ChromiumLauncher::new(config.chrome_executable.clone()));
        let encoder = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
        Self::new(config, launcher, encoder)
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Record `request.target_url` into `request.output_path`.
    ///
    /// The browser session and scratch directory are released on every path.
    pub async fn record(&self, request: RecordRequest) -> RecordOutcome {
        let started = Instant::now();
        let output_path = request.output_path.clone();

        if let Err(e) = request.validate() {
            warn!("Rejected recording request: {}", e);
            return RecordOutcome::failed(output_path, &e);
        }

        let scratch = match tempfile::Builder::new()
            .prefix("reel-recording-")
            .tempdir_in(&self.config.work_dir)
        {
            Ok(dir) => dir,
            Err(e) => {
                let e = MediaError::from(e);
                warn!("Failed to create scratch directory: {}", e);
                return RecordOutcome::failed(output_path, &e);
            }
        };

        let mut session = None;
        let result = self.run(&request, &scratch, &mut session).await;

        if let Some(session) = session.take() {
            release_session(session).await;
        }
        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory {}: {}", scratch_path.display(), e);
        }

        let elapsed = started.elapsed();
        histogram!("reel_record_duration_seconds").record(elapsed.as_secs_f64());

        match result {
            Ok(thumbnail_path) => {
                request.report(RecorderProgress::phase(RecorderPhase::Complete));
                info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Recorded {} to {}",
                    request.target_url,
                    output_path.display()
                );
                RecordOutcome::succeeded(output_path, thumbnail_path)
            }
            Err(e) => {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Recording of {} failed: {}",
                    request.target_url,
                    e
                );
                RecordOutcome::failed(output_path, &e)
            }
        }
    }

    async fn run(
        &self,
        request: &RecordRequest,
        scratch: &TempDir,
        session_slot: &mut Option<Box<dyn BrowserSession>>,
    ) -> MediaResult<Option<PathBuf>> {
        let schedule = FrameSchedule::new(request.duration_ms, request.frame_rate)?;
        request.report(RecorderProgress::phase(RecorderPhase::Initializing));

        let profile_dir = scratch.path().join("profile");
        fs::create_dir_all(&profile_dir).await?;
        let viewport = Viewport {
            width: request.width,
            height: request.height,
        };
        let session = within(
            "browser launch",
            self.config.launch_timeout,
            self.launcher.launch(viewport, &profile_dir),
        )
        .await?;
        let session = session_slot.insert(session);

        within(
            "navigation",
            self.config.navigation_timeout,
            session.open(&request.target_url),
        )
        .await?;

        match tokio::time::timeout(self.config.ready_timeout, session.wait_ready()).await {
            Ok(ready) => ready?,
            Err(_) => {
                return Err(MediaError::timeout("ready signal", self.config.ready_timeout)
                    .with_page_error(session.last_page_error()))
            }
        }

        let fonts = session.evaluate(FONTS_READY_SCRIPT).await?;
        debug!(fonts = %fonts, "Fonts ready");
        tokio::time::sleep(self.config.font_settle).await;

        let animations = AnimationControl::activate(session.as_mut()).await?;
        info!(
            animations = animations.count(),
            frames = schedule.total_frames(),
            fps = schedule.frame_rate(),
            "Capturing {}",
            request.target_url
        );

        let frames_dir = scratch.path().join("frames");
        fs::create_dir_all(&frames_dir).await?;

        let total = schedule.total_frames();
        for index in 0..total {
            animations
                .seek(session.as_mut(), schedule.timestamp_ms(index))
                .await?;
            let png = session.capture_png().await?;
            fs::write(frames_dir.join(FrameSchedule::file_name(index)), png).await?;
            request.report(RecorderProgress::capturing(index, total));
        }
        counter!("reel_frames_captured_total").increment(total as u64);

        // Encoding does not need the browser.
        if let Some(session) = session_slot.take() {
            release_session(session).await;
        }

        request.report(RecorderProgress::phase(RecorderPhase::Stitching));
        let frames = FrameSequence::new(&frames_dir, schedule.frame_rate(), total);
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.encoder.encode(&frames, &request.output_path).await?;

        request.report(RecorderProgress::phase(RecorderPhase::Thumbnail));
        let Some(last_frame) = frames.last_frame() else {
            return Ok(None);
        };
        let thumbnail_path = thumbnail_path_for(&request.output_path);
        match self.encoder.thumbnail(&last_frame, &thumbnail_path).await {
            Ok(()) => Ok(Some(thumbnail_path)),
            Err(e) => {
                warn!("Thumbnail generation failed, continuing without: {}", e);
                Ok(None)
            }
        }
    }
}

/// Thumbnail path next to the video.
pub fn thumbnail_path_for(video: &Path) -> PathBuf {
    video.with_extension("jpg")
}

async fn within<T>(
    stage: &'static str,
    limit: Duration,
    fut: impl Future<Output = MediaResult<T>>,
) -> MediaResult<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| MediaError::timeout(stage, limit))?
}

async fn release_session(session: Box<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        warn!("Failed to close browser session: {}", e);
    }
}
