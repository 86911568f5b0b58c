//! # gridarm-motion
//!
//! Servo-level motion for a four-axis desk arm working over a 3x3 colored grid.
//!
//! ```text
//!  GridActionMapper ──► MotionTarget ──► MotionCoordinator ──► HardwareActuator
//!  (cell, height,        (base, shoulder,  (slow + synchronized   (vendor SDK or
//!   gripper)              elbow, gripper)    trajectories)          MockActuator)
//!                                                 │
//!                                                 ▼
//!                                           ActuatorState
//! ```

pub mod coordinator;
pub mod error;
pub mod grid;
pub mod hardware;
pub mod joint;
pub mod mock;

pub use coordinator::{MotionCoordinator, DEFAULT_STEP_INTERVAL};
pub use error::{MotionError, MotionResult};
pub use grid::{GridActionMapper, GridCell, GripperState, Height, MotionTarget, GRIPPER_CLOSED, GRIPPER_OPEN};
pub use hardware::{HardwareActuator, RiSdkActuator, SdkConfig};
pub use joint::{clamp_pulse, ActuatorState, ArmLayout, JointId, Pose, Pulse, JOINT_COUNT, MAX_PULSE, MIN_PULSE};
pub use mock::MockActuator;
