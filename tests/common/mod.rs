//! Scripted stereo-source and detector fakes driving the pipeline in tests.

use ndarray::{Array2, Array3};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex,
    },
    thread,
    time::Duration,
};
use talon::{
    camera::{GrabOutcome, Rect, RetrieveError, SeekError, StereoCamera},
    detector::{BBox, Detection, Detector, InferError, TargetClass},
    telemetry::{FrameProgress, Lifecycle, PipelineState},
};
use tokio::sync::{broadcast, mpsc};

/// Counted permits gating [`FakeCamera::grab`]; lets a test hold the worker
/// at a known frame.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<u64>, Condvar)>);

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `n` additional grabs.
    pub fn allow(&self, n: u64) {
        let (permits, condvar) = &*self.0;
        *permits.lock().unwrap() += n;
        condvar.notify_all();
    }

    fn acquire(&self) {
        let (permits, condvar) = &*self.0;
        let mut permits = permits.lock().unwrap();
        while *permits == 0 {
            permits = condvar.wait(permits).unwrap();
        }
        *permits -= 1;
    }
}

/// What the fake depth maps are filled with.
#[derive(Clone, Copy, Debug)]
pub enum DepthFill {
    /// Every sample is `index + 1.0`, so aggregates reveal which frame the
    /// map was computed on.
    IndexPlusOne,
    /// Every sample is NaN.
    AllNan,
}

/// In-memory stereo source with scriptable failures.
pub struct FakeCamera {
    frames_total: Option<u64>,
    fps: Option<f32>,
    size: (usize, usize),
    depth_fill: DepthFill,
    transient_at: Vec<u64>,
    fatal_at: Option<u64>,
    depth_fail_at: Vec<u64>,
    grab_delay: Duration,
    gate: Option<Gate>,
    cursor: u64,
    current: Option<u64>,
    depth_retrievals: Arc<AtomicU64>,
}

impl FakeCamera {
    pub fn recorded(frames_total: u64) -> Self {
        Self {
            frames_total: Some(frames_total),
            fps: Some(60.0),
            size: (32, 32),
            depth_fill: DepthFill::IndexPlusOne,
            transient_at: Vec::new(),
            fatal_at: None,
            depth_fail_at: Vec::new(),
            grab_delay: Duration::from_millis(1),
            gate: None,
            cursor: 0,
            current: None,
            depth_retrievals: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn live() -> Self {
        Self { frames_total: None, fps: None, ..Self::recorded(0) }
    }

    pub fn depth_fill(mut self, fill: DepthFill) -> Self {
        self.depth_fill = fill;
        self
    }

    pub fn transient_at(mut self, indices: &[u64]) -> Self {
        self.transient_at = indices.to_vec();
        self
    }

    pub fn fatal_at(mut self, index: u64) -> Self {
        self.fatal_at = Some(index);
        self
    }

    pub fn depth_fail_at(mut self, indices: &[u64]) -> Self {
        self.depth_fail_at = indices.to_vec();
        self
    }

    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    /// Shared counter of `retrieve_depth` calls; clone before handing the
    /// camera to the session.
    pub fn depth_retrievals(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.depth_retrievals)
    }
}

impl StereoCamera for FakeCamera {
    fn grab(&mut self) -> GrabOutcome {
        if let Some(gate) = &self.gate {
            gate.acquire();
        }
        thread::sleep(self.grab_delay);
        let index = self.cursor;
        if let Some(total) = self.frames_total {
            if index >= total {
                return GrabOutcome::EndOfSession;
            }
        }
        if self.fatal_at == Some(index) {
            return GrabOutcome::Fatal("scripted fatal grab failure".into());
        }
        self.cursor += 1;
        if self.transient_at.contains(&index) {
            return GrabOutcome::Transient("scripted transient grab failure".into());
        }
        self.current = Some(index);
        GrabOutcome::Frame
    }

    fn retrieve_left(&mut self) -> Result<Array3<u8>, RetrieveError> {
        let (height, width) = self.size;
        Ok(Array3::zeros((height, width, 3)))
    }

    fn retrieve_depth(&mut self, _roi: Option<Rect>) -> Result<Array2<f32>, RetrieveError> {
        let index = self.current.expect("retrieve_depth before the first grab");
        if self.depth_fail_at.contains(&index) {
            return Err(RetrieveError("scripted depth retrieval failure".into()));
        }
        self.depth_retrievals.fetch_add(1, Ordering::Relaxed);
        let (height, width) = self.size;
        #[allow(clippy::cast_precision_loss)]
        let fill = match self.depth_fill {
            DepthFill::IndexPlusOne => index as f32 + 1.0,
            DepthFill::AllNan => f32::NAN,
        };
        Ok(Array2::from_elem((height, width), fill))
    }

    fn seek(&mut self, target: u64) -> Result<(), SeekError> {
        let Some(frames_total) = self.frames_total else {
            return Err(SeekError::Unsupported);
        };
        if target >= frames_total {
            return Err(SeekError::OutOfRange { target, frames_total });
        }
        self.cursor = target;
        Ok(())
    }

    fn current_index(&self) -> Option<u64> {
        self.current
    }

    fn frames_total(&self) -> Option<u64> {
        self.frames_total
    }

    fn native_fps(&self) -> Option<f32> {
        self.fps
    }
}

/// Detector returning a fixed set of detections per frame.
pub struct FakeDetector {
    per_frame: Vec<Detection>,
    fail_at_call: Option<u64>,
    fail_fatal: bool,
    calls: u64,
}

impl FakeDetector {
    pub fn empty() -> Self {
        Self { per_frame: Vec::new(), fail_at_call: None, fail_fatal: false, calls: 0 }
    }

    pub fn always(per_frame: Vec<Detection>) -> Self {
        Self { per_frame, ..Self::empty() }
    }

    pub fn transient_at_call(mut self, call: u64) -> Self {
        self.fail_at_call = Some(call);
        self
    }

    pub fn fatal_at_call(mut self, call: u64) -> Self {
        self.fail_at_call = Some(call);
        self.fail_fatal = true;
        self
    }
}

impl Detector for FakeDetector {
    fn infer(
        &mut self,
        _left: ndarray::ArrayView3<'_, u8>,
    ) -> Result<Vec<Detection>, InferError> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_at_call == Some(call) {
            return Err(if self.fail_fatal {
                InferError::Fatal("scripted fatal inference failure".into())
            } else {
                InferError::Transient("scripted transient inference failure".into())
            });
        }
        Ok(self.per_frame.clone())
    }
}

/// One within-range target centered in the fake 32x32 frame.
pub fn one_target() -> Vec<Detection> {
    vec![Detection {
        class: TargetClass::WithinRange,
        bbox: BBox { x1: 8.0, y1: 8.0, x2: 24.0, y2: 24.0 },
        confidence: 0.9,
    }]
}

/// Collects progress events until the session's channels close.
pub fn spawn_progress_collector(
    mut rx: broadcast::Receiver<FrameProgress>,
) -> tokio::task::JoinHandle<Vec<FrameProgress>> {
    tokio::spawn(async move {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => events.push(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return events,
            }
        }
    })
}

/// Drains lifecycle events until a terminal state, returning the terminal
/// state, its reason and everything seen on the way.
pub async fn wait_terminal(
    lifecycle: &mut mpsc::UnboundedReceiver<Lifecycle>,
) -> (PipelineState, Option<String>, Vec<Lifecycle>) {
    let mut seen = Vec::new();
    let deadline = Duration::from_secs(30);
    loop {
        let event = tokio::time::timeout(deadline, lifecycle.recv())
            .await
            .expect("timed out waiting for a terminal lifecycle state")
            .expect("lifecycle channel closed before a terminal state");
        let terminal = match &event {
            Lifecycle::State { state, reason }
                if matches!(state, PipelineState::Stopped | PipelineState::Failed) =>
            {
                Some((*state, reason.clone()))
            }
            _ => None,
        };
        seen.push(event);
        if let Some((state, reason)) = terminal {
            return (state, reason, seen);
        }
    }
}

/// Waits until a progress event for `index` has been observed.
pub async fn wait_for_index(rx: &mut broadcast::Receiver<FrameProgress>, index: u64) {
    let deadline = Duration::from_secs(30);
    loop {
        let event = tokio::time::timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for a progress event")
            .expect("progress channel closed");
        if event.index >= index {
            return;
        }
    }
}
