//! Video and thumbnail encoding of captured frames.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use reel_models::encoding::{
    DEFAULT_CRF, DEFAULT_PIXEL_FORMAT, DEFAULT_PRESET, DEFAULT_VIDEO_CODEC,
};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::schedule::FrameSchedule;

/// Ordered PNG frames in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    pub dir: PathBuf,
    pub frame_rate: u32,
    pub count: u32,
}

impl FrameSequence {
    pub fn new(dir: impl Into<PathBuf>, frame_rate: u32, count: u32) -> Self {
        Self {
            dir: dir.into(),
            frame_rate,
            count,
        }
    }

    /// Image sequence pattern understood by FFmpeg.
    pub fn pattern(&self) -> PathBuf {
        self.dir.join(FrameSchedule::FILE_PATTERN)
    }

    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.dir.join(FrameSchedule::file_name(index))
    }

    /// Path of the final frame, if any frame was captured.
    pub fn last_frame(&self) -> Option<PathBuf> {
        self.count.checked_sub(1).map(|index| self.frame_path(index))
    }
}

/// Turns captured frames into a video and a thumbnail.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    /// Encode the whole sequence into a single video at its frame rate.
    async fn encode(&self, frames: &FrameSequence, output: &Path) -> MediaResult<()>;

    /// Convert one frame into a still thumbnail.
    async fn thumbnail(&self, frame: &Path, output: &Path) -> MediaResult<()>;
}

/// Encoder settings.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// FFmpeg executable name or path
    pub ffmpeg_path: PathBuf,
    /// x264 preset
    pub preset: String,
    /// x264 constant rate factor
    pub crf: u8,
    /// Ceiling for one FFmpeg invocation
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            timeout_secs: 300,
        }
    }
}

impl EncoderConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            preset: std::env::var("VIDEO_PRESET").unwrap_or(defaults.preset),
            crf: std::env::var("VIDEO_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crf),
            timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

/// [`FrameEncoder`] backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new(&self.config.ffmpeg_path).with_timeout(self.config.timeout_secs)
    }

    /// H.264 at the frames' own pixel size, playable everywhere.
    pub fn video_command(&self, frames: &FrameSequence, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(frames.pattern(), output)
            .input_frame_rate(frames.frame_rate)
            .video_codec(DEFAULT_VIDEO_CODEC)
            .pixel_format(DEFAULT_PIXEL_FORMAT)
            .preset(&self.config.preset)
            .crf(self.config.crf)
            .output_args(["-movflags", "+faststart"])
    }

    pub fn thumbnail_command(&self, frame: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(frame, output)
            .single_frame()
            .output_args(["-q:v", "2"])
    }
}

#[async_trait]
impl FrameEncoder for FfmpegEncoder {
    async fn encode(&self, frames: &FrameSequence, output: &Path) -> MediaResult<()> {
        info!(
            frames = frames.count,
            fps = frames.frame_rate,
            "Encoding video to {}",
            output.display()
        );
        self.runner().run(&self.video_command(frames, output)).await
    }

    async fn thumbnail(&self, frame: &Path, output: &Path) -> MediaResult<()> {
        self.runner().run(&self.thumbnail_command(frame, output)).await
    }
}
