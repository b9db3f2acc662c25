//! Target detector.
//!
//! Maps a left rectified image to a set of detections through the
//! [`Detector`] trait. The TensorRT-backed YOLO implementation lives in
//! [`yolo`]; tests drive the pipeline with scripted fakes.

pub mod yolo;

use ndarray::ArrayView3;
use serde::Serialize;

/// Detection class.
///
/// The pipeline assumes the two-valued enumeration below but tolerates and
/// passes through any other class identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetClass {
    /// A target within ranging distance.
    WithinRange,
    /// A target beyond ranging distance; never paired with depth
    /// statistics.
    OutOfRange,
    /// Any other class identifier, passed through opaquely.
    Other(u32),
}

impl TargetClass {
    /// Builds a class from a raw model class identifier.
    #[must_use]
    pub fn from_id(id: u32) -> Self {
        match id {
            0 => Self::WithinRange,
            1 => Self::OutOfRange,
            other => Self::Other(other),
        }
    }

    /// Returns the raw model class identifier.
    #[must_use]
    pub fn id(self) -> u32 {
        match self {
            Self::WithinRange => 0,
            Self::OutOfRange => 1,
            Self::Other(id) => id,
        }
    }
}

/// Axis-aligned bounding box in pixel coordinates, `x1 < x2`, `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl BBox {
    /// Box area; zero for degenerate boxes.
    #[must_use]
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// A single detection in the coordinate frame of the input image.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Detection {
    /// Detection class.
    pub class: TargetClass,
    /// Bounding box.
    pub bbox: BBox,
    /// Post-NMS confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Error loading the detector at session setup. Always fatal.
#[derive(Debug, thiserror::Error)]
#[error("EngineLoadFailure: {0}")]
pub struct LoadError(pub String);

/// Per-frame inference error.
#[derive(Debug, thiserror::Error)]
pub enum InferError {
    /// The frame is lost but the engine remains usable.
    #[error("transient inference failure: {0}")]
    Transient(String),
    /// The engine is unusable; the session must end.
    #[error("fatal inference failure: {0}")]
    Fatal(String),
}

/// Object detector over left rectified images.
///
/// Implementations are deterministic given identical input, must not retain
/// references to the input buffer, and return bounding boxes in the input
/// pixel coordinate frame with post-NMS confidences.
pub trait Detector {
    /// Runs inference on an `(H, W, 3)` RGB image.
    fn infer(&mut self, left: ArrayView3<'_, u8>) -> Result<Vec<Detection>, InferError>;
}
