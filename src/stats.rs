//! Cumulative session statistics and the `stats.json` report.

use crate::{
    artifacts::WriterCounts,
    consts::{COMPARISON_SIGNIFICANT_SAMPLES, INTERVAL_HISTOGRAM_BUCKETS_MS},
    timing::{Stage, StageRecord},
};
use eyre::{Result, WrapErr};
use schemars::JsonSchema;
use serde::{Serialize, Serializer};
use std::{fs, path::Path, time::Duration};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// How the session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Stopped on command.
    Stopped,
    /// A recorded session ran out of frames.
    Ended,
    /// A fatal error ended the session.
    Failed,
}

/// Transient per-frame failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransientKind {
    /// The source failed to deliver a frame; the frame is skipped.
    Grab,
    /// Inference failed; the frame is skipped.
    Infer,
    /// Depth retrieval failed; the frame proceeds without a fresh map.
    DepthRetrieve,
}

/// Cumulative counters over the whole session.
#[derive(Debug)]
pub struct SessionStats {
    started: OffsetDateTime,
    frames_processed: u64,
    frames_skipped: u64,
    frames_with_detections: u64,
    frames_empty: u64,
    detections_total: u64,
    depth_retrieve_failures: u64,
    stage_sums_ms: [f64; 4],
    wall_ms: Vec<f64>,
    detection_wall_sum_ms: f64,
    empty_wall_sum_ms: f64,
    interval_counts: [u64; INTERVAL_HISTOGRAM_BUCKETS_MS.len() + 1],
}

impl SessionStats {
    /// Creates empty statistics stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: OffsetDateTime::now_utc(),
            frames_processed: 0,
            frames_skipped: 0,
            frames_with_detections: 0,
            frames_empty: 0,
            detections_total: 0,
            depth_retrieve_failures: 0,
            stage_sums_ms: [0.0; 4],
            wall_ms: Vec::new(),
            detection_wall_sum_ms: 0.0,
            empty_wall_sum_ms: 0.0,
            interval_counts: [0; INTERVAL_HISTOGRAM_BUCKETS_MS.len() + 1],
        }
    }

    /// Records one processed frame.
    pub fn record_frame(&mut self, record: &StageRecord, wall: Duration, detections: usize) {
        self.frames_processed += 1;
        self.detections_total += detections as u64;
        let wall_ms = wall.as_secs_f64() * 1e3;
        if detections > 0 {
            self.frames_with_detections += 1;
            self.detection_wall_sum_ms += wall_ms;
        } else {
            self.frames_empty += 1;
            self.empty_wall_sum_ms += wall_ms;
        }
        for (sum, stage) in self.stage_sums_ms.iter_mut().zip(Stage::ALL) {
            let duration = match stage {
                Stage::Grab => record.grab,
                Stage::Infer => record.infer,
                Stage::Depth => record.depth,
                Stage::Housekeeping => record.housekeeping,
            };
            *sum += duration.as_secs_f64() * 1e3;
        }
        self.wall_ms.push(wall_ms);
    }

    /// Records the interval between two consecutive frame starts.
    pub fn record_interval(&mut self, interval: Duration) {
        let interval_ms = interval.as_secs_f64() * 1e3;
        let bucket = INTERVAL_HISTOGRAM_BUCKETS_MS
            .iter()
            .position(|&le| interval_ms <= le)
            .unwrap_or(INTERVAL_HISTOGRAM_BUCKETS_MS.len());
        self.interval_counts[bucket] += 1;
    }

    /// Records a transient failure.
    pub fn record_transient(&mut self, kind: TransientKind) {
        match kind {
            TransientKind::Grab | TransientKind::Infer => self.frames_skipped += 1,
            TransientKind::DepthRetrieve => self.depth_retrieve_failures += 1,
        }
    }

    /// Number of frames processed so far.
    #[must_use]
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Builds the end-of-session report.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize(
        self,
        outcome: Outcome,
        reason: Option<String>,
        active: Duration,
        writer: WriterCounts,
    ) -> SessionReport {
        let frames = self.frames_processed as f64;
        let stage_means: Vec<f64> = self.stage_sums_ms.iter().map(|sum| sum / frames).collect();
        let stage_total: f64 = stage_means.iter().sum();
        let stage = |index: usize| StageReport {
            mean: stage_means[index],
            share_pct: stage_means[index] / stage_total * 100.0,
        };

        let mut sorted = self.wall_ms.clone();
        sorted.sort_unstable_by(f64::total_cmp);
        let percentile = |p: f64| {
            if sorted.is_empty() {
                return f64::NAN;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let rank = ((p / 100.0 * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
            sorted[rank - 1]
        };

        let detection_mean = self.detection_wall_sum_ms / self.frames_with_detections as f64;
        let empty_mean = self.empty_wall_sum_ms / self.frames_empty as f64;
        let interval_histogram = self
            .interval_counts
            .iter()
            .enumerate()
            .map(|(index, &count)| IntervalBucket {
                le_ms: INTERVAL_HISTOGRAM_BUCKETS_MS.get(index).copied(),
                count,
            })
            .collect();

        SessionReport {
            session: SessionSection {
                started_utc: rfc3339(self.started),
                ended_utc: rfc3339(OffsetDateTime::now_utc()),
                outcome,
                reason,
            },
            counts: CountsSection {
                frames_processed: self.frames_processed,
                frames_skipped: self.frames_skipped,
                frames_with_detections: self.frames_with_detections,
                frames_empty: self.frames_empty,
                detections_total: self.detections_total,
                depth_retrieve_failures: self.depth_retrieve_failures,
            },
            timing_ms: TimingSection {
                grab: stage(0),
                infer: stage(1),
                depth: stage(2),
                housekeeping: stage(3),
                wall_mean: self.wall_ms.iter().sum::<f64>() / frames,
                wall_p50: percentile(50.0),
                wall_p95: percentile(95.0),
                fps_global: frames / active.as_secs_f64(),
                interval_histogram,
            },
            detection_vs_empty_ms: ComparisonSection {
                detection_mean,
                empty_mean,
                delta_ms: detection_mean - empty_mean,
                delta_pct: (detection_mean - empty_mean) / empty_mean * 100.0,
                significant: self.frames_with_detections
                    >= COMPARISON_SIGNIFICANT_SAMPLES as u64
                    && self.frames_empty >= COMPARISON_SIGNIFICANT_SAMPLES as u64,
            },
            writer: WriterSection {
                jpeg_written: writer.jpeg_written,
                txt_written: writer.txt_written,
                drops: writer.drops,
                io_errors: writer.io_errors,
            },
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp.format(&Rfc3339).unwrap_or_else(|_| "unknown".into())
}

fn finite_or_null<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_unit()
    }
}

/// Session identity and outcome.
#[derive(Clone, Debug, Serialize, JsonSchema)]
pub struct SessionSection {
    /// Session start, RFC 3339 UTC.
    pub started_utc: String,
    /// Session end, RFC 3339 UTC.
    pub ended_utc: String,
    /// How the session ended.
    pub outcome: Outcome,
    /// Failure reason; present iff the outcome is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Frame and detection counters.
#[derive(Clone, Copy, Debug, Serialize, JsonSchema)]
pub struct CountsSection {
    /// Frames fully processed.
    pub frames_processed: u64,
    /// Frames lost to transient grab or inference failures.
    pub frames_skipped: u64,
    /// Processed frames with at least one detection.
    pub frames_with_detections: u64,
    /// Processed frames without detections.
    pub frames_empty: u64,
    /// Detections over the whole session.
    pub detections_total: u64,
    /// Depth retrieval failures; the affected frames still processed.
    pub depth_retrieve_failures: u64,
}

/// Full-run mean and share of one stage.
#[derive(Clone, Copy, Debug, Serialize, JsonSchema)]
pub struct StageReport {
    /// Mean over the full run in milliseconds.
    #[serde(serialize_with = "finite_or_null")]
    pub mean: f64,
    /// Share of the summed stage means, in percent.
    #[serde(serialize_with = "finite_or_null")]
    pub share_pct: f64,
}

/// One bucket of the frame-interval histogram.
#[derive(Clone, Copy, Debug, Serialize, JsonSchema)]
pub struct IntervalBucket {
    /// Inclusive upper bound in milliseconds; `null` for the unbounded
    /// final bucket.
    pub le_ms: Option<f64>,
    /// Number of intervals in this bucket.
    pub count: u64,
}

/// Full-run timing aggregates.
#[derive(Clone, Debug, Serialize, JsonSchema)]
pub struct TimingSection {
    /// Grab stage.
    pub grab: StageReport,
    /// Inference stage.
    pub infer: StageReport,
    /// Depth stage.
    pub depth: StageReport,
    /// Housekeeping stage.
    pub housekeeping: StageReport,
    /// Mean frame wall time in milliseconds.
    #[serde(serialize_with = "finite_or_null")]
    pub wall_mean: f64,
    /// Median frame wall time in milliseconds.
    #[serde(serialize_with = "finite_or_null")]
    pub wall_p50: f64,
    /// 95th percentile frame wall time in milliseconds.
    #[serde(serialize_with = "finite_or_null")]
    pub wall_p95: f64,
    /// Frames per second over the active (unpaused) session time.
    #[serde(serialize_with = "finite_or_null")]
    pub fps_global: f64,
    /// Histogram of frame-to-frame intervals.
    pub interval_histogram: Vec<IntervalBucket>,
}

/// Full-run detection-vs-empty comparison.
#[derive(Clone, Copy, Debug, Serialize, JsonSchema)]
pub struct ComparisonSection {
    /// Mean wall time of frames with detections in milliseconds.
    #[serde(serialize_with = "finite_or_null")]
    pub detection_mean: f64,
    /// Mean wall time of empty frames in milliseconds.
    #[serde(serialize_with = "finite_or_null")]
    pub empty_mean: f64,
    /// Absolute difference in milliseconds.
    #[serde(serialize_with = "finite_or_null")]
    pub delta_ms: f64,
    /// Difference relative to the empty mean, in percent.
    #[serde(serialize_with = "finite_or_null")]
    pub delta_pct: f64,
    /// `true` once both partitions hold enough frames to compare.
    pub significant: bool,
}

/// Artifact writer counters.
#[derive(Clone, Copy, Debug, Serialize, JsonSchema)]
pub struct WriterSection {
    /// Annotated JPEG files written.
    pub jpeg_written: u64,
    /// Label text files written.
    pub txt_written: u64,
    /// Artifacts dropped on writer backpressure.
    pub drops: u64,
    /// Per-frame write failures.
    pub io_errors: u64,
}

/// The end-of-session summary persisted as `stats.json`.
#[derive(Clone, Debug, Serialize, JsonSchema)]
pub struct SessionReport {
    /// Session identity and outcome.
    pub session: SessionSection,
    /// Frame and detection counters.
    pub counts: CountsSection,
    /// Full-run timing aggregates.
    pub timing_ms: TimingSection,
    /// Full-run detection-vs-empty comparison.
    pub detection_vs_empty_ms: ComparisonSection,
    /// Artifact writer counters.
    pub writer: WriterSection,
}

impl SessionReport {
    /// Writes the report as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .wrap_err_with(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(grab: u64, infer: u64, depth: u64, housekeeping: u64) -> StageRecord {
        StageRecord {
            grab: Duration::from_millis(grab),
            infer: Duration::from_millis(infer),
            depth: Duration::from_millis(depth),
            housekeeping: Duration::from_millis(housekeeping),
        }
    }

    #[test]
    fn test_counters_and_shares() {
        let mut stats = SessionStats::new();
        for i in 0..10 {
            stats.record_frame(&record(5, 10, 3, 2), Duration::from_millis(20), i % 2);
        }
        stats.record_transient(TransientKind::Grab);
        stats.record_transient(TransientKind::DepthRetrieve);
        let report = stats.finalize(
            Outcome::Stopped,
            None,
            Duration::from_secs(2),
            WriterCounts::default(),
        );
        assert_eq!(report.counts.frames_processed, 10);
        assert_eq!(report.counts.frames_skipped, 1);
        assert_eq!(report.counts.depth_retrieve_failures, 1);
        assert_eq!(report.counts.frames_with_detections, 5);
        assert_eq!(report.counts.frames_empty, 5);
        assert_eq!(report.counts.detections_total, 5);
        assert_relative_eq!(report.timing_ms.fps_global, 5.0);
        let share_sum = report.timing_ms.grab.share_pct
            + report.timing_ms.infer.share_pct
            + report.timing_ms.depth.share_pct
            + report.timing_ms.housekeeping.share_pct;
        assert_relative_eq!(share_sum, 100.0, epsilon = 0.1);
        assert_relative_eq!(report.timing_ms.infer.share_pct, 50.0);
        assert_relative_eq!(report.timing_ms.wall_mean, 20.0);
        assert!(!report.detection_vs_empty_ms.significant);
    }

    #[test]
    fn test_non_finite_serializes_as_null() {
        let stats = SessionStats::new();
        let report = stats.finalize(
            Outcome::Failed,
            Some("EngineLoadFailure: engine file not found".into()),
            Duration::ZERO,
            WriterCounts::default(),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["timing_ms"]["grab"]["mean"].is_null());
        assert!(json["timing_ms"]["wall_p50"].is_null());
        assert!(json["detection_vs_empty_ms"]["delta_pct"].is_null());
        assert_eq!(json["session"]["outcome"], "failed");
        assert!(json["session"]["reason"]
            .as_str()
            .unwrap()
            .starts_with("EngineLoadFailure"));
    }

    #[test]
    fn test_interval_histogram_buckets() {
        let mut stats = SessionStats::new();
        stats.record_interval(Duration::from_millis(4));
        stats.record_interval(Duration::from_millis(16));
        stats.record_interval(Duration::from_secs(1));
        let report = stats.finalize(
            Outcome::Ended,
            None,
            Duration::from_secs(1),
            WriterCounts::default(),
        );
        let histogram = &report.timing_ms.interval_histogram;
        assert_eq!(histogram.len(), INTERVAL_HISTOGRAM_BUCKETS_MS.len() + 1);
        assert_eq!(histogram[0].count, 1);
        assert_eq!(histogram[2].count, 1);
        assert_eq!(histogram.last().unwrap().count, 1);
        assert_eq!(histogram.last().unwrap().le_ms, None);
        let total: u64 = histogram.iter().map(|bucket| bucket.count).sum();
        assert_eq!(total, 3);
    }
}
