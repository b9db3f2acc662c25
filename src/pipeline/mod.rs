//! Pipeline orchestrator.
//!
//! One session drives one camera through a four-stage per-frame pipeline on
//! a dedicated thread. The thread exclusively owns the camera handle and the
//! inference engine for the whole session; nothing else may touch them. This
//! single-owner rule is what keeps the SDK wrappers, which are not
//! documented as thread-safe, free of data races: front-ends talk to the
//! session exclusively through the command channel and the telemetry stream.

mod worker;

use crate::{
    camera::{CameraConfig, OpenError, SourceDescriptor, StereoCamera},
    config::Config,
    control::{self, Command, CommandSender},
    detector::{Detector, LoadError},
    telemetry::{self, FrameProgress, Lifecycle},
};
use std::thread;
use tokio::sync::{broadcast, mpsc};
use worker::Worker;

/// A running pipeline session.
///
/// Dropping the session does not stop the orchestrator; send
/// [`Command::Stop`] and call [`Session::join`] for an orderly shutdown.
#[derive(Debug)]
pub struct Session {
    commands: CommandSender,
    progress: broadcast::Sender<FrameProgress>,
    lifecycle: Option<mpsc::UnboundedReceiver<Lifecycle>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Session {
    /// Spawns the orchestrator thread for one session.
    ///
    /// The factories run on the orchestrator thread during initialization,
    /// so neither the camera handle nor the engine ever crosses a thread
    /// boundary.
    pub fn spawn<C, D, FC, FD>(config: Config, camera_factory: FC, detector_factory: FD) -> Self
    where
        C: StereoCamera + 'static,
        D: Detector + 'static,
        FC: FnOnce(&SourceDescriptor, &CameraConfig) -> Result<C, OpenError> + Send + 'static,
        FD: FnOnce() -> Result<D, LoadError> + Send + 'static,
    {
        let (commands, command_rx) = control::channel();
        let (telemetry_tx, progress, lifecycle_rx) = telemetry::channel();
        let thread = thread::Builder::new()
            .name("talon-pipeline".into())
            .spawn(move || {
                Worker::bring_up(config, camera_factory, detector_factory, command_rx, telemetry_tx);
            })
            .expect("failed to spawn the pipeline thread");
        Self {
            commands,
            progress,
            lifecycle: Some(lifecycle_rx),
            thread: Some(thread),
        }
    }

    /// Returns a handle for enqueueing commands.
    #[must_use]
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Enqueues a command.
    pub fn send(&self, command: Command) {
        self.commands.send(command);
    }

    /// Subscribes to the lossy per-frame progress stream.
    #[must_use]
    pub fn subscribe_progress(&self) -> broadcast::Receiver<FrameProgress> {
        self.progress.subscribe()
    }

    /// Takes the lossless lifecycle receiver. Returns `None` when already
    /// taken.
    pub fn take_lifecycle(&mut self) -> Option<mpsc::UnboundedReceiver<Lifecycle>> {
        self.lifecycle.take()
    }

    /// Waits for the orchestrator thread to terminate.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
