//! Deterministic frame schedule.

use crate::error::{MediaError, MediaResult};

/// Which frames to capture and at which logical animation time.
///
/// Derived only from duration and frame rate, so two recordings with the same
/// inputs always capture the same frames at the same timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchedule {
    duration_ms: u64,
    frame_rate: u32,
    total_frames: u32,
}

impl FrameSchedule {
    /// Build the schedule, `total_frames = ceil(duration_ms / 1000 * frame_rate)`.
    pub fn new(duration_ms: u64, frame_rate: u32) -> MediaResult<Self> {
        if frame_rate == 0 {
            return Err(MediaError::invalid_request("frame rate must be non-zero"));
        }
        if duration_ms == 0 {
            return Err(MediaError::invalid_request("duration must be non-zero"));
        }

        let total = duration_ms
            .checked_mul(frame_rate as u64)
            .ok_or_else(|| MediaError::invalid_request("too many frames requested"))?
            .div_ceil(1000);
        let total_frames = u32::try_from(total)
            .map_err(|_| MediaError::invalid_request("too many frames requested"))?;

        Ok(Self {
            duration_ms,
            frame_rate,
            total_frames,
        })
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Milliseconds between consecutive frames.
    pub fn interval_ms(&self) -> f64 {
        1000.0 / self.frame_rate as f64
    }

    /// Logical animation time of frame `index`.
    pub fn timestamp_ms(&self, index: u32) -> f64 {
        index as f64 * 1000.0 / self.frame_rate as f64
    }

    /// Timestamps of every frame, in capture order.
    pub fn timestamps(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.total_frames).map(|index| self.timestamp_ms(index))
    }

    /// File name of frame `index` inside the scratch directory.
    pub fn file_name(index: u32) -> String {
        format!("frame_{:05}.png", index)
    }

    /// FFmpeg image sequence pattern matching [`FrameSchedule::file_name`].
    pub const FILE_PATTERN: &'static str = "frame_%05d.png";
}
