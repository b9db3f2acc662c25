//! Project constants.

use std::time::Duration;

/// Capacity of each rolling stage-timing window.
pub const STAGE_WINDOW: usize = 60;

/// Minimum samples per stage window before per-stage shares are reported.
pub const STAGE_WARMUP_SAMPLES: usize = 5;

/// Minimum samples in each detection-outcome window before the
/// detection-vs-empty comparison is considered significant.
pub const COMPARISON_SIGNIFICANT_SAMPLES: usize = 30;

/// Wake-up interval of the cooperative pause loop.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of grabs performed and discarded while warming up the depth
/// backend.
pub const DEPTH_WARMUP_GRABS: u32 = 2;

/// Default lower depth clipping bound in meters.
pub const DEFAULT_DEPTH_MIN: f32 = 1.0;

/// Default upper depth clipping bound in meters.
pub const DEFAULT_DEPTH_MAX: f32 = 40.0;

/// Default number of reuse frames after which a decimated depth map is
/// reported stale.
pub const DEFAULT_DEPTH_STALE_AFTER: u64 = 60;

/// Default detector confidence threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;

/// IoU threshold of the detector's class-wise non-maximum suppression.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Default JPEG quality of annotated frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Default root of per-session output directories.
pub const DEFAULT_OUTPUT_ROOT: &str = "/var/lib/talon/sessions";

/// Default path of the prebuilt detector engine.
pub const DEFAULT_ENGINE_PATH: &str = "/opt/talon/models/target.engine";

/// Capacity of the lossy frame-progress broadcast channel.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Upper bucket bounds in milliseconds of the frame-interval histogram. The
/// final implicit bucket is unbounded.
pub const INTERVAL_HISTOGRAM_BUCKETS_MS: [f64; 8] =
    [5.0, 10.0, 17.0, 25.0, 34.0, 50.0, 100.0, 250.0];
