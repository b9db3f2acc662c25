//! Depth decimation schedule.
//!
//! The detector runs on every frame, but depth maps are only computed on a
//! configurable subset; the remaining frames reuse the most recent map.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Requested depth-map rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepthRate {
    /// Compute a depth map on every frame.
    EveryFrame,
    /// Compute depth maps at this frequency, derived from the source's
    /// native frame rate.
    Hz(f32),
    /// Compute a depth map every `k` frames; the form to use when the native
    /// frame rate is unknown (live sources).
    EveryK(u32),
}

impl Default for DepthRate {
    fn default() -> Self {
        Self::EveryFrame
    }
}

/// Frame-index based sampling schedule derived from a [`DepthRate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthSchedule {
    skip_interval: u64,
}

impl DepthSchedule {
    /// Builds a schedule for a source with the given native frame rate.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(rate: DepthRate, native_fps: Option<f32>) -> Self {
        let skip_interval = match rate {
            DepthRate::EveryFrame => 1,
            DepthRate::EveryK(k) => u64::from(k.max(1)),
            DepthRate::Hz(hz) => match native_fps {
                Some(fps) if hz > 0.0 => (fps / hz).round().max(1.0) as u64,
                _ => {
                    tracing::warn!(
                        "depth rate {rate:?} needs a known source frame rate; \
                         sampling every frame"
                    );
                    1
                }
            },
        };
        Self { skip_interval }
    }

    /// Returns `true` when the frame at `index` is a depth frame.
    #[must_use]
    pub fn should_sample(&self, index: u64) -> bool {
        index % self.skip_interval == 0
    }

    /// Number of frames between depth frames.
    #[must_use]
    pub fn skip_interval(&self) -> u64 {
        self.skip_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_frame() {
        let schedule = DepthSchedule::new(DepthRate::EveryFrame, Some(60.0));
        assert_eq!(schedule.skip_interval(), 1);
        assert!((0..10).all(|index| schedule.should_sample(index)));
    }

    #[test]
    fn test_hz_against_native_fps() {
        let schedule = DepthSchedule::new(DepthRate::Hz(10.0), Some(60.0));
        assert_eq!(schedule.skip_interval(), 6);
        let sampled: Vec<u64> = (0..20).filter(|&index| schedule.should_sample(index)).collect();
        assert_eq!(sampled, &[0, 6, 12, 18]);
    }

    #[test]
    fn test_hz_rounds_and_clamps() {
        assert_eq!(DepthSchedule::new(DepthRate::Hz(25.0), Some(60.0)).skip_interval(), 2);
        // Faster than the source degenerates to every frame.
        assert_eq!(DepthSchedule::new(DepthRate::Hz(120.0), Some(60.0)).skip_interval(), 1);
    }

    #[test]
    fn test_hz_without_fps_degenerates() {
        assert_eq!(DepthSchedule::new(DepthRate::Hz(10.0), None).skip_interval(), 1);
    }

    #[test]
    fn test_every_k() {
        let schedule = DepthSchedule::new(DepthRate::EveryK(4), None);
        assert!(schedule.should_sample(0));
        assert!(!schedule.should_sample(3));
        assert!(schedule.should_sample(8));
        assert_eq!(DepthSchedule::new(DepthRate::EveryK(0), None).skip_interval(), 1);
    }
}
