//! Control surface of the pipeline.
//!
//! Front-ends steer the orchestrator through a single-producer command
//! channel. Enqueueing never blocks and never fails while the orchestrator
//! is alive; commands that are invalid for the current state are rejected
//! with a diagnostic on the lifecycle stream and do not mutate state.

use crate::schedule::DepthRate;
use tokio::sync::mpsc;

/// A command to the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Begin processing frames. Valid in the ready state.
    Start,
    /// Suspend frame processing. Valid while running.
    Pause,
    /// Resume frame processing. Valid while paused.
    Resume,
    /// Skip forward over the next `frames` frames. Valid while paused on a
    /// recorded source.
    Skip {
        /// Number of frames to skip; at least 1.
        frames: u64,
    },
    /// Replace the depth decimation rate, effective from the next frame.
    ReconfigureDepth {
        /// The new rate.
        rate: DepthRate,
    },
    /// End the session. Valid in any non-terminal state.
    Stop,
}

impl Command {
    /// Short command name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Pause => "Pause",
            Self::Resume => "Resume",
            Self::Skip { .. } => "Skip",
            Self::ReconfigureDepth { .. } => "ReconfigureDepth",
            Self::Stop => "Stop",
        }
    }
}

/// Non-blocking handle for enqueueing commands.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Enqueues a command. Silently dropped once the orchestrator has
    /// terminated.
    pub fn send(&self, command: Command) {
        let _ = self.tx.send(command);
    }
}

/// Creates the command channel.
#[must_use]
pub fn channel() -> (CommandSender, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, rx)
}
