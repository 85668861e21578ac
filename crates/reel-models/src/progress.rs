//! Recorder progress reporting.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stage of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecorderPhase {
    Initializing,
    Capturing,
    Stitching,
    Thumbnail,
    Complete,
}

impl RecorderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderPhase::Initializing => "initializing",
            RecorderPhase::Capturing => "capturing",
            RecorderPhase::Stitching => "stitching",
            RecorderPhase::Thumbnail => "thumbnail",
            RecorderPhase::Complete => "complete",
        }
    }
}

/// Overall percentage at which each phase starts.
pub const INITIALIZING_PERCENT: u8 = 5;
pub const CAPTURE_START_PERCENT: u8 = 15;
pub const CAPTURE_END_PERCENT: u8 = 75;
pub const STITCHING_PERCENT: u8 = 80;
pub const THUMBNAIL_PERCENT: u8 = 90;
pub const COMPLETE_PERCENT: u8 = 100;

/// Progress event emitted by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecorderProgress {
    pub phase: RecorderPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u32>,
    /// Overall progress (0-100)
    pub percent: u8,
}

impl RecorderProgress {
    /// Progress for a phase without frame counters.
    pub fn phase(phase: RecorderPhase) -> Self {
        let percent = match phase {
            RecorderPhase::Initializing => INITIALIZING_PERCENT,
            RecorderPhase::Capturing => CAPTURE_START_PERCENT,
            RecorderPhase::Stitching => STITCHING_PERCENT,
            RecorderPhase::Thumbnail => THUMBNAIL_PERCENT,
            RecorderPhase::Complete => COMPLETE_PERCENT,
        };
        Self {
            phase,
            current_frame: None,
            total_frames: None,
            percent,
        }
    }

    /// Capture progress for frame `index` (zero-based) of `total`.
    ///
    /// Scaled into the capture range of overall progress.
    pub fn capturing(index: u32, total: u32) -> Self {
        let span = (CAPTURE_END_PERCENT - CAPTURE_START_PERCENT) as u64;
        let scaled = if total == 0 {
            0
        } else {
            (index.min(total) as u64 * span) / total as u64
        };
        Self {
            phase: RecorderPhase::Capturing,
            current_frame: Some(index + 1),
            total_frames: Some(total),
            percent: CAPTURE_START_PERCENT + scaled as u8,
        }
    }

    /// Message shown to pollers for this event.
    pub fn status_message(&self) -> String {
        match (self.phase, self.current_frame, self.total_frames) {
            (RecorderPhase::Initializing, _, _) => "Launching browser".to_string(),
            (RecorderPhase::Capturing, Some(n), Some(total)) => {
                format!("Capturing frame {}/{}", n, total)
            }
            (RecorderPhase::Capturing, _, _) => "Capturing frames".to_string(),
            (RecorderPhase::Stitching, _, _) => "Encoding video".to_string(),
            (RecorderPhase::Thumbnail, _, _) => "Generating thumbnail".to_string(),
            (RecorderPhase::Complete, _, _) => "Complete".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_progress_stays_in_range() {
        let total = 250;
        let mut last = 0;
        for index in 0..total {
            let p = RecorderProgress::capturing(index, total);
            assert!(p.percent >= CAPTURE_START_PERCENT);
            assert!(p.percent < CAPTURE_END_PERCENT);
            assert!(p.percent >= last);
            last = p.percent;
        }
        assert_eq!(RecorderProgress::capturing(0, total).current_frame, Some(1));
    }

    #[test]
    fn test_phase_percentages_increase() {
        let phases = [
            RecorderPhase::Initializing,
            RecorderPhase::Capturing,
            RecorderPhase::Stitching,
            RecorderPhase::Thumbnail,
            RecorderPhase::Complete,
        ];
        let percents: Vec<u8> = phases
            .iter()
            .map(|p| RecorderProgress::phase(*p).percent)
            .collect();
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(
            RecorderProgress::capturing(9, 250).status_message(),
            "Capturing frame 10/250"
        );
        assert_eq!(
            RecorderProgress::phase(RecorderPhase::Stitching).status_message(),
            "Encoding video"
        );
    }

    #[test]
    fn test_serializes_snake_case_phase() {
        let json = serde_json::to_value(RecorderProgress::capturing(4, 10)).unwrap();
        assert_eq!(json["phase"], "capturing");
        assert_eq!(json["currentFrame"], 5);
        assert_eq!(json["totalFrames"], 10);
    }
}
