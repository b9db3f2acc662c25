//! Stereo camera adapter.
//!
//! The pipeline consumes rectified stereo sources through the
//! [`StereoCamera`] trait, which abstracts both live sensors and recorded
//! session files behind a narrow blocking interface. The ZED-backed
//! implementation lives in [`zed`]; tests drive the pipeline with in-memory
//! fakes.

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
pub mod zed;

use ndarray::{Array2, Array3};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::consts::{DEFAULT_DEPTH_MAX, DEFAULT_DEPTH_MIN};

/// Identifies a stereo source.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// A live sensor, optionally selected by device index.
    Live {
        /// Device index; the first detected camera when `None`.
        device_id: Option<u32>,
    },
    /// A recorded session file on the local filesystem.
    Recording {
        /// Path of the opaque session file.
        path: PathBuf,
    },
}

impl SourceDescriptor {
    /// Returns `true` for live sensors.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        Self::Live { device_id: None }
    }
}

/// Depth backend quality preset.
///
/// Backend-specific mode enumerations never leave the camera adapter; the
/// rest of the system only sees these three labels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepthPreset {
    /// Lowest latency, noisiest maps.
    Fast,
    /// The default trade-off.
    #[default]
    Balanced,
    /// Highest quality, slowest.
    Best,
}

/// Resolution hint passed to the source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// 1280x720.
    #[default]
    Hd720,
    /// 1920x1080.
    Hd1080,
    /// 672x376.
    Vga,
}

/// Depth clipping interval in meters. Samples outside are invalid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DepthRange {
    /// Lower bound in meters.
    pub min: f32,
    /// Upper bound in meters.
    pub max: f32,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self { min: DEFAULT_DEPTH_MIN, max: DEFAULT_DEPTH_MAX }
    }
}

/// Source configuration applied at open time.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CameraConfig {
    /// Resolution hint.
    pub resolution: Resolution,
    /// Target native frame rate; the source picks when `None`.
    pub fps: Option<f32>,
    /// Depth backend quality preset.
    pub depth_preset: DepthPreset,
    /// Depth clipping interval.
    pub depth_range: DepthRange,
}

/// A rectangular region in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Outcome of a single [`StereoCamera::grab`] call.
#[derive(Debug)]
pub enum GrabOutcome {
    /// A new frame is available for retrieval.
    Frame,
    /// Normal termination of a recorded session.
    EndOfSession,
    /// The frame is lost but the source remains usable; the cursor still
    /// advances.
    Transient(String),
    /// The source is unusable; the session must end.
    Fatal(String),
}

/// Error opening a stereo source.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// No usable camera on the requested interface.
    #[error("CameraUnavailable: {0}")]
    CameraUnavailable(String),
    /// The recorded session file is missing or corrupt.
    #[error("InvalidSession: {0}")]
    InvalidSession(String),
    /// The source rejected the requested configuration.
    #[error("ConfigurationRejected: {0}")]
    ConfigurationRejected(String),
}

/// Error retrieving data for the most recently grabbed frame.
#[derive(Debug, thiserror::Error)]
#[error("retrieve failed: {0}")]
pub struct RetrieveError(pub String);

/// Error repositioning a recorded session.
#[derive(Debug, thiserror::Error)]
pub enum SeekError {
    /// The source is live.
    #[error("SeekUnsupported: live sources cannot seek")]
    Unsupported,
    /// The target lies outside the recorded session.
    #[error("OutOfRange: target {target} not in [0, {frames_total})")]
    OutOfRange {
        /// Requested frame index.
        target: u64,
        /// Number of frames in the session.
        frames_total: u64,
    },
}

/// Blocking interface over a rectified stereo source.
///
/// Implementations deliver the left rectified image and the depth map in one
/// shared pixel coordinate space: pixel `(x, y)` of the image corresponds to
/// sample `depth[(y, x)]`.
pub trait StereoCamera {
    /// Advances to the next frame, blocking until it is captured.
    fn grab(&mut self) -> GrabOutcome;

    /// Returns the left rectified image of the most recently grabbed frame
    /// as an `(H, W, 3)` RGB array.
    ///
    /// Valid only after [`StereoCamera::grab`] returned
    /// [`GrabOutcome::Frame`].
    fn retrieve_left(&mut self) -> Result<Array3<u8>, RetrieveError>;

    /// Returns the depth map in meters for the most recently grabbed frame,
    /// optionally restricted to `roi`. May be called at most once per
    /// grabbed frame.
    fn retrieve_depth(&mut self, roi: Option<Rect>) -> Result<Array2<f32>, RetrieveError>;

    /// Positions the source so that the next [`StereoCamera::grab`] delivers
    /// the frame at `target`. Backward seeks are rejected by the pipeline,
    /// not the adapter.
    fn seek(&mut self, target: u64) -> Result<(), SeekError>;

    /// Index of the most recently grabbed frame; `None` before the first
    /// grab.
    fn current_index(&self) -> Option<u64>;

    /// Number of frames in the source; `None` for live sensors.
    fn frames_total(&self) -> Option<u64>;

    /// Native frame rate of the source; `None` when unknown.
    fn native_fps(&self) -> Option<f32>;

    /// Performs backend-specific warm-up so that the first depth map of the
    /// session is usable, leaving the source positioned at its first frame.
    ///
    /// The default implementation is a no-op for backends that need none.
    fn warm_up(&mut self) -> Result<(), RetrieveError> {
        Ok(())
    }
}
