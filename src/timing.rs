//! Rolling per-stage latency accounting.

use crate::{
    consts::{COMPARISON_SIGNIFICANT_SAMPLES, STAGE_WARMUP_SAMPLES, STAGE_WINDOW},
    window::RollingWindow,
};
use serde::Serialize;
use std::time::Duration;

/// The four pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for the source to deliver a frame.
    Grab,
    /// Detector inference.
    Infer,
    /// Depth retrieval and per-detection aggregation.
    Depth,
    /// Artifact dispatch, accounting and telemetry.
    Housekeeping,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Grab, Stage::Infer, Stage::Depth, Stage::Housekeeping];
}

/// Stage durations of one processed frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageRecord {
    /// Time spent in [`Stage::Grab`].
    pub grab: Duration,
    /// Time spent in [`Stage::Infer`].
    pub infer: Duration,
    /// Time spent in [`Stage::Depth`].
    pub depth: Duration,
    /// Time spent in [`Stage::Housekeeping`].
    pub housekeeping: Duration,
}

impl StageRecord {
    fn get(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Grab => self.grab,
            Stage::Infer => self.infer,
            Stage::Depth => self.depth,
            Stage::Housekeeping => self.housekeeping,
        }
    }
}

/// Rolling mean and share of one stage.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StageSnapshot {
    /// Rolling mean in milliseconds.
    pub mean_ms: f64,
    /// Share of the summed stage means, in percent. Zero while warming up.
    pub share_pct: f64,
}

/// Rolling wall-time aggregates over the recent frames.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct WallSnapshot {
    /// Mean in milliseconds.
    pub mean_ms: f64,
    /// Median in milliseconds.
    pub p50_ms: f64,
    /// 95th percentile in milliseconds.
    pub p95_ms: f64,
    /// Minimum in milliseconds.
    pub min_ms: f64,
    /// Maximum in milliseconds.
    pub max_ms: f64,
}

/// Comparison of frames with detections against empty frames.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ComparisonSnapshot {
    /// Rolling mean wall time of frames with at least one detection.
    pub detection_mean_ms: Option<f64>,
    /// Rolling mean wall time of empty frames.
    pub empty_mean_ms: Option<f64>,
    /// Absolute difference in milliseconds.
    pub delta_ms: Option<f64>,
    /// Difference relative to the empty mean, in percent.
    pub delta_pct: Option<f64>,
    /// `true` once both partitions hold enough samples to compare.
    pub significant: bool,
}

/// Consistent view over all rolling windows.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct TimingSnapshot {
    /// Per-stage means and shares, ordered as [`Stage::ALL`].
    pub stages: [StageSnapshot; 4],
    /// `true` while any stage window is under-observed; shares are zero.
    pub warming_up: bool,
    /// Wall-time aggregates over the recent frames.
    pub wall: WallSnapshot,
    /// Detection-vs-empty comparison.
    pub comparison: ComparisonSnapshot,
}

/// Owns the six rolling windows of the timing core: one per stage plus the
/// per-frame wall times partitioned by detection outcome.
#[derive(Debug)]
pub struct StageBank {
    stages: [RollingWindow<f64>; 4],
    detection_wall: RollingWindow<f64>,
    empty_wall: RollingWindow<f64>,
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

impl StageBank {
    /// Creates an empty bank.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: [
                RollingWindow::new(STAGE_WINDOW),
                RollingWindow::new(STAGE_WINDOW),
                RollingWindow::new(STAGE_WINDOW),
                RollingWindow::new(STAGE_WINDOW),
            ],
            detection_wall: RollingWindow::new(STAGE_WINDOW),
            empty_wall: RollingWindow::new(STAGE_WINDOW),
        }
    }

    /// Records one processed frame.
    pub fn push(&mut self, record: &StageRecord, wall: Duration, had_detections: bool) {
        for (window, stage) in self.stages.iter_mut().zip(Stage::ALL) {
            window.push(ms(record.get(stage)));
        }
        if had_detections {
            self.detection_wall.push(ms(wall));
        } else {
            self.empty_wall.push(ms(wall));
        }
    }

    /// Atomically replaces all windows with empty ones.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Returns a consistent snapshot of every window.
    #[must_use]
    pub fn snapshot(&self) -> TimingSnapshot {
        let means = self.stages.iter().map(|window| window.mean().unwrap_or(0.0));
        let mut stages = [StageSnapshot::default(); 4];
        for (snapshot, mean) in stages.iter_mut().zip(means) {
            snapshot.mean_ms = mean;
        }
        let warming_up =
            self.stages.iter().any(|window| window.len() < STAGE_WARMUP_SAMPLES);
        if !warming_up {
            let total: f64 = stages.iter().map(|snapshot| snapshot.mean_ms).sum();
            if total > 0.0 {
                for snapshot in &mut stages {
                    snapshot.share_pct = snapshot.mean_ms / total * 100.0;
                }
            }
        }
        TimingSnapshot {
            stages,
            warming_up,
            wall: self.wall_snapshot(),
            comparison: self.comparison_snapshot(),
        }
    }

    fn wall_snapshot(&self) -> WallSnapshot {
        // The two partitions jointly cover every processed frame.
        let mut merged = Vec::with_capacity(self.detection_wall.len() + self.empty_wall.len());
        merged.extend(self.detection_wall.iter().copied());
        merged.extend(self.empty_wall.iter().copied());
        if merged.is_empty() {
            return WallSnapshot::default();
        }
        merged.sort_unstable_by(f64::total_cmp);
        #[allow(clippy::cast_precision_loss)]
        let mean_ms = merged.iter().sum::<f64>() / merged.len() as f64;
        let rank = |p: f64| {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let index = ((p / 100.0 * merged.len() as f64).ceil() as usize).clamp(1, merged.len());
            merged[index - 1]
        };
        WallSnapshot {
            mean_ms,
            p50_ms: rank(50.0),
            p95_ms: rank(95.0),
            min_ms: merged[0],
            max_ms: merged[merged.len() - 1],
        }
    }

    fn comparison_snapshot(&self) -> ComparisonSnapshot {
        let detection_mean_ms = self.detection_wall.mean();
        let empty_mean_ms = self.empty_wall.mean();
        let delta_ms = match (detection_mean_ms, empty_mean_ms) {
            (Some(detection), Some(empty)) => Some(detection - empty),
            _ => None,
        };
        let delta_pct = match (delta_ms, empty_mean_ms) {
            (Some(delta), Some(empty)) if empty > 0.0 => Some(delta / empty * 100.0),
            _ => None,
        };
        ComparisonSnapshot {
            detection_mean_ms,
            empty_mean_ms,
            delta_ms,
            delta_pct,
            significant: self.detection_wall.len() >= COMPARISON_SIGNIFICANT_SAMPLES
                && self.empty_wall.len() >= COMPARISON_SIGNIFICANT_SAMPLES,
        }
    }
}

impl Default for StageBank {
    fn default() -> Self {
        Self::new()
    }
}
