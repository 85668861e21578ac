//! Frame-accurate recording of animated HTML templates.
//!
//! This crate provides:
//! - An animation control protocol that pauses and seeks page animations
//! - A deterministic frame schedule
//! - A browser session abstraction with a Chromium (CDP) implementation
//! - Type-safe FFmpeg command building and a runner that keeps encoder diagnostics
//! - The [`Recorder`], which ties the above into one failure-safe operation

pub mod animation;
pub mod browser;
pub mod chromium;
pub mod command;
pub mod encode;
pub mod error;
pub mod fs_utils;
pub mod recorder;
pub mod schedule;

pub use animation::{AnimationControl, AnimationTiming};
pub use browser::{BrowserLauncher, BrowserSession, Viewport};
pub use chromium::ChromiumLauncher;
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use encode::{EncoderConfig, FfmpegEncoder, FrameEncoder, FrameSequence};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_file_if_exists};
pub use recorder::{ProgressCallback, RecordOutcome, RecordRequest, Recorder, RecorderConfig};
pub use schedule::FrameSchedule;
