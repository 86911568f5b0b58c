//! Error types for the control layer

use gridarm_motion::MotionError;
use gridarm_voice::VoiceError;
use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while configuring the arm or running a task
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed decision response: {0}")]
    MalformedDecision(String),

    #[error("Decision request failed: {0}")]
    Decision(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Configuration(err.to_string())
    }
}

impl CoreError {
    /// Errors that end the current task. Per-step and per-action errors are logged and skipped.
    pub fn is_task_fatal(&self) -> bool {
        match self {
            CoreError::Motion(e) => !e.is_per_action(),
            CoreError::MalformedDecision(_) => false,
            _ => true,
        }
    }
}
