//! The per-session worker loop.

use crate::{
    artifacts::{self, ArtifactWriter, FrameArtifacts},
    camera::{CameraConfig, GrabOutcome, OpenError, SourceDescriptor, StereoCamera},
    config::Config,
    consts::PAUSE_POLL_INTERVAL,
    control::Command,
    depth::{self, DepthStats},
    detector::{Detector, InferError, LoadError},
    schedule::{DepthRate, DepthSchedule},
    stats::{Outcome, SessionStats, TransientKind},
    telemetry::{
        DepthSummary, FrameProgress, InitMilestone, Lifecycle, PipelineState, TelemetryTx, Warning,
    },
    timing::{StageBank, StageRecord},
};
use ndarray::Array2;
use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// The most recently computed depth map and the frame it belongs to.
struct LastDepth {
    map: Array2<f32>,
    index: u64,
}

/// What the command drain decided.
enum Flow {
    Continue,
    Pause,
    Stop,
}

/// How a pause ended.
enum PauseExit {
    Resumed,
    Stopped,
}

/// How the running loop ended.
enum RunExit {
    Stopped,
    Ended,
    Failed(String),
}

pub(super) struct Worker<C> {
    config: Config,
    camera: C,
    commands: mpsc::UnboundedReceiver<Command>,
    telemetry: TelemetryTx,
    bank: StageBank,
    schedule: DepthSchedule,
    last_depth: Option<LastDepth>,
    stale_warned: bool,
    stats: SessionStats,
    writer: Option<ArtifactWriter>,
    session_dir: PathBuf,
    run_started: Option<Instant>,
    paused_total: Duration,
    last_frame_start: Option<Instant>,
}

impl<C: StereoCamera> Worker<C> {
    /// Runs the whole session on the current thread: initialization,
    /// the ready/running state machine and teardown.
    pub(super) fn bring_up<D, FC, FD>(
        config: Config,
        camera_factory: FC,
        detector_factory: FD,
        commands: mpsc::UnboundedReceiver<Command>,
        telemetry: TelemetryTx,
    ) where
        D: Detector,
        FC: FnOnce(&SourceDescriptor, &CameraConfig) -> Result<C, OpenError>,
        FD: FnOnce() -> Result<D, LoadError>,
    {
        telemetry.state(PipelineState::Initializing);
        telemetry.lifecycle(Lifecycle::Milestone(InitMilestone::OpeningCamera));
        let mut camera = match camera_factory(&config.source, &config.camera) {
            Ok(camera) => camera,
            Err(err) => return fail_init(&telemetry, err.to_string()),
        };
        telemetry.lifecycle(Lifecycle::Milestone(InitMilestone::WarmingDepthBackend));
        if let Err(err) = camera.warm_up() {
            return fail_init(&telemetry, format!("CameraUnavailable: {err}"));
        }
        telemetry.lifecycle(Lifecycle::Milestone(InitMilestone::LoadingEngine));
        let detector = match detector_factory() {
            Ok(detector) => detector,
            Err(err) => return fail_init(&telemetry, err.to_string()),
        };
        telemetry.lifecycle(Lifecycle::Milestone(InitMilestone::Finalizing));
        let schedule = DepthSchedule::new(config.depth_rate, camera.native_fps());
        let session_dir = config
            .artifacts
            .output_root
            .join(artifacts::session_dir_name(OffsetDateTime::now_utc()));
        let writer = (config.artifacts.save_annotated_image || config.artifacts.save_label_file)
            .then(|| ArtifactWriter::spawn(&config.artifacts, &session_dir));
        let worker = Worker {
            config,
            camera,
            commands,
            telemetry,
            bank: StageBank::new(),
            schedule,
            last_depth: None,
            stale_warned: false,
            stats: SessionStats::new(),
            writer,
            session_dir,
            run_started: None,
            paused_total: Duration::ZERO,
            last_frame_start: None,
        };
        worker.run(detector);
    }

    fn run<D: Detector>(mut self, mut detector: D) {
        self.telemetry.state(PipelineState::Ready);
        loop {
            match self.commands.blocking_recv() {
                Some(Command::Start) => break,
                Some(Command::Stop) | None => return self.teardown(Outcome::Stopped, None),
                Some(Command::ReconfigureDepth { rate }) => self.reconfigure_depth(rate),
                Some(command) => self.reject(
                    command.name(),
                    "only Start, Stop and ReconfigureDepth are valid before the session runs",
                ),
            }
        }
        self.run_started = Some(Instant::now());
        self.telemetry.state(PipelineState::Running);
        match self.running_loop(&mut detector) {
            RunExit::Stopped => self.teardown(Outcome::Stopped, None),
            RunExit::Ended => self.teardown(Outcome::Ended, None),
            RunExit::Failed(reason) => self.teardown(Outcome::Failed, Some(reason)),
        }
    }

    fn running_loop<D: Detector>(&mut self, detector: &mut D) -> RunExit {
        loop {
            match self.drain_commands() {
                Flow::Continue => {}
                Flow::Stop => return RunExit::Stopped,
                Flow::Pause => match self.pause_loop() {
                    PauseExit::Resumed => continue,
                    PauseExit::Stopped => return RunExit::Stopped,
                },
            }
            if let Some(exit) = self.process_frame(detector) {
                return exit;
            }
        }
    }

    /// Processes a single frame, returning `Some` when the session must
    /// leave the running state.
    #[allow(clippy::too_many_lines)]
    fn process_frame<D: Detector>(&mut self, detector: &mut D) -> Option<RunExit> {
        let frame_start = Instant::now();
        if let Some(previous) = self.last_frame_start.replace(frame_start) {
            self.stats.record_interval(frame_start.duration_since(previous));
        }
        match self.camera.grab() {
            GrabOutcome::Frame => {}
            GrabOutcome::EndOfSession => return Some(RunExit::Ended),
            GrabOutcome::Transient(reason) => {
                tracing::warn!("transient grab failure: {reason}");
                self.stats.record_transient(TransientKind::Grab);
                return None;
            }
            GrabOutcome::Fatal(reason) => {
                // A stop that was already requested wins over the fault: the
                // shutdown intent precedes it.
                if self.stop_pending() {
                    return Some(RunExit::Stopped);
                }
                return Some(RunExit::Failed(format!("CameraFatal: {reason}")));
            }
        }
        let grab_end = Instant::now();
        let index = self
            .camera
            .current_index()
            .expect("the camera delivered a frame without an index");

        let left = match self.camera.retrieve_left() {
            Ok(left) => left,
            Err(err) => {
                tracing::warn!("failed to retrieve frame {index}: {err}");
                self.stats.record_transient(TransientKind::Grab);
                return None;
            }
        };
        let detections = match detector.infer(left.view()) {
            Ok(detections) => detections,
            Err(InferError::Transient(reason)) => {
                tracing::warn!("transient inference failure on frame {index}: {reason}");
                self.stats.record_transient(TransientKind::Infer);
                return None;
            }
            Err(InferError::Fatal(reason)) => {
                if self.stop_pending() {
                    return Some(RunExit::Stopped);
                }
                return Some(RunExit::Failed(format!("InferFatal: {reason}")));
            }
        };
        let infer_end = Instant::now();

        if self.schedule.should_sample(index) {
            match self.camera.retrieve_depth(None) {
                Ok(map) => {
                    self.last_depth = Some(LastDepth { map, index });
                    self.stale_warned = false;
                }
                Err(err) => {
                    // The frame proceeds as if it were not depth-scheduled.
                    tracing::warn!("depth retrieval failed on frame {index}: {err}");
                    self.stats.record_transient(TransientKind::DepthRetrieve);
                }
            }
        }
        let depth_stats = match &self.last_depth {
            Some(last) => {
                let age = index.saturating_sub(last.index);
                if age > self.config.depth_stale_after_frames && !self.stale_warned {
                    self.stale_warned = true;
                    self.telemetry
                        .lifecycle(Lifecycle::Warning(Warning::DepthMapStale { age_frames: age }));
                }
                depth::extract(last.map.view(), &self.config.camera.depth_range, &detections)
            }
            None => vec![DepthStats::NoDepth; detections.len()],
        };
        let depth_end = Instant::now();

        if let Some(writer) = &self.writer {
            writer.dispatch(FrameArtifacts {
                index,
                image: left,
                detections: detections.clone(),
                stats: depth_stats.clone(),
            });
        }

        let record = StageRecord {
            grab: grab_end.duration_since(frame_start),
            infer: infer_end.duration_since(grab_end),
            depth: depth_end.duration_since(infer_end),
            housekeeping: depth_end.elapsed(),
        };
        let wall = frame_start.elapsed();
        self.bank.push(&record, wall, !detections.is_empty());
        self.stats.record_frame(&record, wall, detections.len());

        let ranged: Vec<f32> = depth_stats.iter().filter_map(DepthStats::mean).collect();
        #[allow(clippy::cast_precision_loss)]
        self.telemetry.progress(FrameProgress {
            index,
            global_fps: self.stats.frames_processed() as f64
                / self.active_duration().as_secs_f64(),
            timing: self.bank.snapshot(),
            detection_count: detections.len(),
            depth: DepthSummary {
                ranged_targets: ranged.len(),
                nearest_m: ranged.iter().copied().reduce(f32::min),
            },
            wall_ms: wall.as_secs_f64() * 1e3,
        });
        None
    }

    fn drain_commands(&mut self) -> Flow {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Pause) => return Flow::Pause,
                Ok(Command::Stop) => return Flow::Stop,
                Ok(Command::ReconfigureDepth { rate }) => self.reconfigure_depth(rate),
                Ok(Command::Start) => self.reject("Start", "the session is already running"),
                Ok(Command::Resume) => self.reject("Resume", "the session is not paused"),
                Ok(Command::Skip { .. }) => {
                    self.reject("Skip", "skipping is only valid while paused");
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
                Err(TryRecvError::Disconnected) => return Flow::Stop,
            }
        }
    }

    fn pause_loop(&mut self) -> PauseExit {
        self.telemetry.state(PipelineState::Paused);
        let pause_start = Instant::now();
        loop {
            loop {
                match self.commands.try_recv() {
                    Ok(Command::Resume) => {
                        self.paused_total += pause_start.elapsed();
                        self.telemetry.state(PipelineState::Running);
                        return PauseExit::Resumed;
                    }
                    Ok(Command::Stop) => return PauseExit::Stopped,
                    Ok(Command::Skip { frames }) => self.handle_skip(frames),
                    Ok(Command::ReconfigureDepth { rate }) => self.reconfigure_depth(rate),
                    Ok(Command::Pause) => self.reject("Pause", "the session is already paused"),
                    Ok(Command::Start) => self.reject("Start", "the session is already running"),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return PauseExit::Stopped,
                }
            }
            thread::sleep(PAUSE_POLL_INTERVAL);
        }
    }

    fn handle_skip(&mut self, frames: u64) {
        if frames == 0 {
            return self.reject("Skip", "the skip count must be at least 1");
        }
        let Some(frames_total) = self.camera.frames_total() else {
            return self.reject("Skip", "SkipOnLive: live sources cannot skip");
        };
        if frames_total == 0 {
            return self.reject("Skip", "OutOfRangeSeek: the session has no frames");
        }
        // The cursor conceptually sits at -1 before the first grab.
        let target = self.camera.current_index().map_or(frames - 1, |index| index + frames);
        let target = if target >= frames_total {
            let clamped = frames_total - 1;
            self.telemetry
                .lifecycle(Lifecycle::Warning(Warning::SkipClamped { clamped_to: clamped }));
            clamped
        } else {
            target
        };
        match self.camera.seek(target) {
            Ok(()) => {
                // The retained depth map now belongs to a far-past frame.
                self.last_depth = None;
                self.stale_warned = false;
            }
            Err(err) => self.reject("Skip", err.to_string()),
        }
    }

    fn reconfigure_depth(&mut self, rate: DepthRate) {
        // Effective from the next frame; the retained depth map survives.
        self.schedule = DepthSchedule::new(rate, self.camera.native_fps());
        tracing::info!(
            "depth schedule reconfigured to every {} frame(s)",
            self.schedule.skip_interval()
        );
    }

    fn reject(&self, command: &'static str, reason: impl Into<String>) {
        self.telemetry.lifecycle(Lifecycle::IllegalCommand { command, reason: reason.into() });
    }

    /// Checks whether a stop has already been enqueued; used to resolve
    /// fatal errors that race a requested shutdown.
    fn stop_pending(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => return true,
                Ok(_) => {}
                Err(TryRecvError::Empty) => return false,
            }
        }
    }

    fn active_duration(&self) -> Duration {
        self.run_started
            .map_or(Duration::ZERO, |started| started.elapsed().saturating_sub(self.paused_total))
    }

    fn teardown(self, outcome: Outcome, reason: Option<String>) {
        let Worker { telemetry, stats, writer, session_dir, camera, run_started, paused_total, .. } =
            self;
        let active = run_started
            .map_or(Duration::ZERO, |started| started.elapsed().saturating_sub(paused_total));
        let writer_counts = writer.map(ArtifactWriter::finish).unwrap_or_default();
        // Release the camera before surfacing the terminal state.
        drop(camera);
        // The statistics artifact exists iff the session ever ran.
        if run_started.is_some() {
            let report = stats.finalize(outcome, reason.clone(), active, writer_counts);
            if let Err(err) = report.write(&session_dir.join("stats.json")) {
                tracing::error!("failed to persist session statistics: {err}");
            }
        }
        match outcome {
            Outcome::Stopped | Outcome::Ended => telemetry.state(PipelineState::Stopped),
            Outcome::Failed => telemetry.lifecycle(Lifecycle::State {
                state: PipelineState::Failed,
                reason,
            }),
        }
    }
}

fn fail_init(telemetry: &TelemetryTx, reason: String) {
    tracing::error!("session initialization failed: {reason}");
    telemetry.lifecycle(Lifecycle::State {
        state: PipelineState::Failed,
        reason: Some(reason),
    });
}
