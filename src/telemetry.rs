//! Telemetry stream of the pipeline.
//!
//! Two event kinds leave the orchestrator: per-frame progress, published on
//! a lossy broadcast channel that slow subscribers may drop from, and
//! lifecycle events, published losslessly. Emission is an O(1) enqueue and
//! never blocks the orchestrator.

use crate::{consts::PROGRESS_CHANNEL_CAPACITY, timing::TimingSnapshot};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

/// Pipeline state, as surfaced through lifecycle events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Loading camera and engine.
    Initializing,
    /// Initialization complete, awaiting a start command.
    Ready,
    /// Processing frames.
    Running,
    /// Suspended; no frames are grabbed.
    Paused,
    /// Terminal: resources released, statistics flushed.
    Stopped,
    /// Terminal: a fatal error ended the session.
    Failed,
}

/// Initialization milestone, surfaced while in
/// [`PipelineState::Initializing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMilestone {
    /// Opening the stereo source.
    OpeningCamera,
    /// Performing depth backend warm-up grabs.
    WarmingDepthBackend,
    /// Deserializing the inference engine.
    LoadingEngine,
    /// Building windows, schedule and writers.
    Finalizing,
}

/// Non-fatal condition worth surfacing.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    /// A reused depth map is older than the configured staleness bound.
    DepthMapStale {
        /// Age of the reused map in frames.
        age_frames: u64,
    },
    /// A skip target beyond the end of the session was clamped.
    SkipClamped {
        /// The index the cursor was clamped to.
        clamped_to: u64,
    },
}

/// Lossless lifecycle event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// The pipeline entered a new state.
    State {
        /// The new state.
        state: PipelineState,
        /// Failure reason; present iff `state` is [`PipelineState::Failed`].
        reason: Option<String>,
    },
    /// Initialization progressed to a new milestone.
    Milestone(InitMilestone),
    /// A command was rejected without mutating state.
    IllegalCommand {
        /// Name of the rejected command.
        command: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// A non-fatal condition was observed.
    Warning(Warning),
}

/// Depth summary of the most recent frame with ranged targets.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct DepthSummary {
    /// Detections that produced valid depth statistics.
    pub ranged_targets: usize,
    /// Mean distance of the nearest ranged target in meters.
    pub nearest_m: Option<f32>,
}

/// Lossy per-frame progress event.
#[derive(Clone, Debug, Serialize)]
pub struct FrameProgress {
    /// Source frame index.
    pub index: u64,
    /// Frames processed per second since the session started running.
    pub global_fps: f64,
    /// Rolling stage timings and shares.
    pub timing: TimingSnapshot,
    /// Number of detections in this frame.
    pub detection_count: usize,
    /// Depth summary of this frame.
    pub depth: DepthSummary,
    /// Wall time of this frame in milliseconds.
    pub wall_ms: f64,
}

/// Sending half of the telemetry stream, owned by the orchestrator.
#[derive(Debug)]
pub struct TelemetryTx {
    progress: broadcast::Sender<FrameProgress>,
    lifecycle: mpsc::UnboundedSender<Lifecycle>,
}

impl TelemetryTx {
    /// Publishes a progress event. Dropped when no subscriber keeps up.
    pub fn progress(&self, event: FrameProgress) {
        let _ = self.progress.send(event);
    }

    /// Publishes a lifecycle event.
    pub fn lifecycle(&self, event: Lifecycle) {
        tracing::debug!("lifecycle: {event:?}");
        let _ = self.lifecycle.send(event);
    }

    /// Publishes a state transition.
    pub fn state(&self, state: PipelineState) {
        self.lifecycle(Lifecycle::State { state, reason: None });
    }
}

/// Creates the telemetry channels.
///
/// Returns the orchestrator-side sender, a handle for subscribing to
/// progress events and the lossless lifecycle receiver.
#[must_use]
pub fn channel() -> (TelemetryTx, broadcast::Sender<FrameProgress>, mpsc::UnboundedReceiver<Lifecycle>)
{
    let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
    let (lifecycle, lifecycle_rx) = mpsc::unbounded_channel();
    (TelemetryTx { progress: progress.clone(), lifecycle }, progress, lifecycle_rx)
}
