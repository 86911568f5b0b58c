//! Error types for arm motion

use crate::joint::JointId;
use thiserror::Error;

/// Result type alias for motion operations
pub type MotionResult<T> = Result<T, MotionError>;

/// Errors raised while initializing the controller, mapping actions or moving joints
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MotionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Hardware write failed on joint {joint}: {message}")]
    HardwareWrite { joint: JointId, message: String },

    #[error("Unknown grid cell: {0}")]
    UnknownCell(String),

    #[error("Invalid arm height: {0} (expected raised or lowered)")]
    InvalidHeight(String),

    #[error("Unknown joint: {0}")]
    UnknownJoint(JointId),

    #[error("Position of joint {0} was never established; home the arm first")]
    UnknownPosition(JointId),
}

impl MotionError {
    /// Mapping errors that only invalidate one action; the task may continue.
    pub fn is_per_action(&self) -> bool {
        matches!(self, MotionError::UnknownCell(_) | MotionError::InvalidHeight(_))
    }
}
