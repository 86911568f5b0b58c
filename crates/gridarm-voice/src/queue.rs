//! Hand-off of transcribed commands from the intake thread to the control loop.
//!
//! Unbounded FIFO, non-blocking push, blocking pop with timeout. The receiver
//! is not `Clone`, so there is exactly one consumer.

use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;

/// Playback speed attached to commands produced by the intake loop.
pub const DEFAULT_COMMAND_SPEED: f32 = 1.2;

/// A transcribed instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub text: String,
    /// Playback speed for feedback spoken in reply.
    pub speed: f32,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speed: DEFAULT_COMMAND_SPEED,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }
}

/// Create a connected sender/receiver pair.
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel();
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer side; cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    /// Enqueue without blocking. Returns `false` once the receiver is gone.
    pub fn push(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<Command>,
}

impl CommandReceiver {
    /// Wait up to `timeout` for the next command. `None` on timeout or when every sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Command> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<Command> {
        self.rx.try_recv().ok()
    }

    /// Like [`Self::recv_timeout`] but tells a timeout apart from a closed queue.
    pub fn poll(&self, timeout: Duration) -> CommandPoll {
        match self.rx.recv_timeout(timeout) {
            Ok(command) => CommandPoll::Ready(command),
            Err(mpsc::RecvTimeoutError::Timeout) => CommandPoll::Empty,
            Err(mpsc::RecvTimeoutError::Disconnected) => CommandPoll::Closed,
        }
    }
}

/// Result of [`CommandReceiver::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPoll {
    Ready(Command),
    Empty,
    /// Every sender is gone and the queue is drained.
    Closed,
}
