//! Per-detection depth aggregation.
//!
//! Depth maps are pervasively invalid: sensor noise, occlusion and
//! reflective surfaces leave NaN, infinite or out-of-range samples scattered
//! through every frame. Aggregating without masking would contaminate every
//! statistic, so validity filtering happens before any arithmetic, and "no
//! depth" is a first-class outcome rather than an error.

use crate::{
    camera::DepthRange,
    detector::{BBox, Detection, TargetClass},
};
use ndarray::ArrayView2;
use serde::Serialize;

/// Depth aggregate of a single detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthStats {
    /// No valid depth sample inside the detection box.
    NoDepth,
    /// Aggregates over the valid samples inside the detection box.
    Valid(DepthAggregate),
}

/// Aggregates over at least one valid depth sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DepthAggregate {
    /// Number of valid samples.
    pub valid_count: usize,
    /// Mean distance in meters.
    pub mean: f32,
    /// Closest valid sample in meters.
    pub min: f32,
    /// Farthest valid sample in meters.
    pub max: f32,
    /// Unbiased sample standard deviation; `0.0` for a single sample.
    pub stdev: f32,
}

impl DepthStats {
    /// Mean distance, or `None` for the sentinel.
    #[must_use]
    pub fn mean(&self) -> Option<f32> {
        match self {
            Self::NoDepth => None,
            Self::Valid(aggregate) => Some(aggregate.mean),
        }
    }

    /// Number of valid samples; zero for the sentinel.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        match self {
            Self::NoDepth => 0,
            Self::Valid(aggregate) => aggregate.valid_count,
        }
    }
}

/// Clips a box to the `(height, width)` sample grid, returning integer
/// bounds `(x1, y1, x2, y2)` with `x2`/`y2` exclusive, or `None` when the
/// clipped region has zero area.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clip_to_grid(bbox: &BBox, height: usize, width: usize) -> Option<(usize, usize, usize, usize)> {
    #[allow(clippy::cast_precision_loss)]
    let (w, h) = (width as f32, height as f32);
    let x1 = bbox.x1.max(0.0).floor();
    let y1 = bbox.y1.max(0.0).floor();
    let x2 = bbox.x2.min(w).ceil();
    let y2 = bbox.y2.min(h).ceil();
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1 as usize, y1 as usize, (x2 as usize).min(width), (y2 as usize).min(height)))
}

/// Aggregates the valid depth samples inside one detection box.
#[must_use]
pub fn extract_one(depth: ArrayView2<'_, f32>, range: &DepthRange, bbox: &BBox) -> DepthStats {
    let (height, width) = depth.dim();
    let Some((x1, y1, x2, y2)) = clip_to_grid(bbox, height, width) else {
        return DepthStats::NoDepth;
    };
    let region = depth.slice(ndarray::s![y1..y2, x1..x2]);
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &sample in &region {
        if !sample.is_finite() || sample <= 0.0 || sample < range.min || sample > range.max {
            continue;
        }
        count += 1;
        sum += f64::from(sample);
        min = min.min(sample);
        max = max.max(sample);
    }
    if count == 0 {
        return DepthStats::NoDepth;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / count as f64;
    let stdev = if count == 1 {
        0.0
    } else {
        let squared: f64 = region
            .iter()
            .filter(|sample| {
                sample.is_finite()
                    && **sample > 0.0
                    && **sample >= range.min
                    && **sample <= range.max
            })
            .map(|&sample| (f64::from(sample) - mean).powi(2))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let variance = squared / (count - 1) as f64;
        variance.sqrt()
    };
    #[allow(clippy::cast_possible_truncation)]
    DepthStats::Valid(DepthAggregate {
        valid_count: count,
        mean: mean as f32,
        min,
        max,
        stdev: stdev as f32,
    })
}

/// Aggregates depth for every detection, aligned with the input order.
///
/// Out-of-range targets are never paired with depth statistics; they carry
/// the sentinel unconditionally.
#[must_use]
pub fn extract(
    depth: ArrayView2<'_, f32>,
    range: &DepthRange,
    detections: &[Detection],
) -> Vec<DepthStats> {
    detections
        .iter()
        .map(|detection| {
            if detection.class == TargetClass::OutOfRange {
                DepthStats::NoDepth
            } else {
                extract_one(depth, range, &detection.bbox)
            }
        })
        .collect()
}
