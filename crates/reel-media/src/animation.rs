//! Animation control protocol.
//!
//! Page animations are paused once and then driven by explicit seeks, so the
//! captured frames depend on logical time rather than wall-clock time. The
//! protocol is installed as `window.__reelAnimation` with two entry points:
//!
//! - `activate()` pauses every animation in `document.getAnimations()` and
//!   returns each one's computed timing.
//! - `seek(times)` sets `currentTime` of animation `i` to `times[i]`. Each
//!   assignment is isolated, so one failing animation does not stop the rest.
//!
//! Clamping happens on the host side from the timings `activate()` reported.

use serde::Deserialize;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::error::{MediaError, MediaResult};

/// Installs the protocol and pauses every animation.
pub const ACTIVATE_SCRIPT: &str = r#"(() => {
  const paused = document.getAnimations();
  window.__reelAnimation = {
    version: 1,
    paused,
    seek(times) {
      let applied = 0;
      paused.forEach((animation, i) => {
        if (i >= times.length) return;
        try {
          animation.currentTime = times[i];
          applied += 1;
        } catch (err) {
          // unsupported animation, skip it
        }
      });
      return applied;
    },
  };
  return paused.map((animation) => {
    animation.pause();
    const timing = animation.effect ? animation.effect.getComputedTiming() : {};
    return {
      duration: typeof timing.duration === 'number' ? timing.duration : 0,
      iterations: Number.isFinite(timing.iterations) ? timing.iterations : null,
      delay: typeof timing.delay === 'number' ? timing.delay : 0,
    };
  });
})()"#;

/// Computed timing of one paused animation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AnimationTiming {
    /// Duration of a single iteration in milliseconds
    pub duration: f64,
    /// Iteration count, `None` when it repeats forever
    pub iterations: Option<f64>,
    /// Start delay in milliseconds
    #[serde(default)]
    pub delay: f64,
}

impl AnimationTiming {
    /// Latest time this animation may be seeked to.
    ///
    /// Bounded animations end at `duration * iterations + delay`; a negative
    /// delay shortens that. Unbounded animations are capped at exactly one
    /// iteration.
    pub fn max_time(&self) -> f64 {
        let duration = self.duration.max(0.0);
        match self.iterations {
            Some(iterations) => duration * iterations.max(0.0) + self.delay,
            None => duration,
        }
    }

    /// Clamp a requested time into `[0, max_time]`.
    pub fn clamp(&self, time_ms: f64) -> f64 {
        time_ms.min(self.max_time()).max(0.0)
    }
}

/// Host side of the protocol for one page.
#[derive(Debug, Clone, Default)]
pub struct AnimationControl {
    timings: Vec<AnimationTiming>,
}

impl AnimationControl {
    /// Pause every animation in the page and record their timings.
    pub async fn activate(session: &mut dyn BrowserSession) -> MediaResult<Self> {
        let value = session.evaluate(ACTIVATE_SCRIPT).await?;
        let timings: Vec<AnimationTiming> = serde_json::from_value(value)
            .map_err(|e| MediaError::Script(format!("unexpected activate() result: {}", e)))?;
        debug!(animations = timings.len(), "Paused page animations");
        Ok(Self { timings })
    }

    /// Number of animations under control.
    pub fn count(&self) -> usize {
        self.timings.len()
    }

    /// Per-animation target times for a requested timestamp.
    pub fn seek_times(&self, time_ms: f64) -> Vec<f64> {
        self.timings.iter().map(|t| t.clamp(time_ms)).collect()
    }

    /// Expression that seeks every animation to `time_ms`.
    pub fn seek_expression(&self, time_ms: f64) -> MediaResult<String> {
        let times = serde_json::to_string(&self.seek_times(time_ms))?;
        Ok(format!("window.__reelAnimation.seek({})", times))
    }

    /// Seek every animation, returning how many accepted the new time.
    pub async fn seek(&self, session: &mut dyn BrowserSession, time_ms: f64) -> MediaResult<u64> {
        if self.timings.is_empty() {
            return Ok(0);
        }
        let value = session.evaluate(&self.seek_expression(time_ms)?).await?;
        Ok(value.as_u64().unwrap_or(0))
    }
}

impl From<Vec<AnimationTiming>> for AnimationControl {
    fn from(timings: Vec<AnimationTiming>) -> Self {
        Self { timings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(duration: f64, iterations: Option<f64>, delay: f64) -> AnimationTiming {
        AnimationTiming {
            duration,
            iterations,
            delay,
        }
    }

    #[test]
    fn test_finite_animation_max_time() {
        let t = timing(1000.0, Some(3.0), 500.0);
        assert_eq!(t.max_time(), 3500.0);
        assert_eq!(t.clamp(2000.0), 2000.0);
        assert_eq!(t.clamp(9000.0), 3500.0);
    }

    #[test]
    fn test_infinite_animation_capped_at_one_iteration() {
        let t = timing(800.0, None, 200.0);
        assert_eq!(t.max_time(), 800.0);
        assert_eq!(t.clamp(5000.0), 800.0);
    }

    #[test]
    fn test_seek_never_exceeds_max() {
        let control = AnimationControl::from(vec![
            timing(1000.0, Some(1.0), 0.0),
            timing(250.0, None, 0.0),
            timing(2000.0, Some(2.0), 100.0),
            timing(1000.0, Some(1.0), -400.0),
        ]);
        for step in 0..200 {
            let requested = step as f64 * 40.0;
            let times = control.seek_times(requested);
            assert!(times[0] <= 1000.0);
            assert!(times[1] <= 250.0);
            assert!(times[2] <= 4100.0);
            assert!(times[3] <= 600.0);
        }
        assert_eq!(control.seek_times(120.0), vec![120.0, 120.0, 120.0, 120.0]);
        assert_eq!(control.seek_times(900.0)[3], 600.0);
    }

    #[test]
    fn test_negative_delay_past_end_clamps_to_zero() {
        let t = timing(300.0, Some(1.0), -500.0);
        assert_eq!(t.max_time(), -200.0);
        assert_eq!(t.clamp(1000.0), 0.0);
        assert_eq!(t.clamp(0.0), 0.0);
    }

    #[test]
    fn test_seek_expression_passes_json_array() {
        let control = AnimationControl::from(vec![timing(100.0, Some(1.0), 0.0)]);
        assert_eq!(
            control.seek_expression(400.0).unwrap(),
            "window.__reelAnimation.seek([100.0])"
        );
    }

    #[test]
    fn test_timing_from_page_json() {
        let value = serde_json::json!([
            {"duration": 600, "iterations": null, "delay": 0},
            {"duration": 1200.5, "iterations": 2, "delay": 100}
        ]);
        let timings: Vec<AnimationTiming> = serde_json::from_value(value).unwrap();
        assert_eq!(timings[0].iterations, None);
        assert_eq!(timings[1].max_time(), 2501.0);
    }
}
