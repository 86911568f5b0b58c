//! Joint identifiers, pulse-width bounds and the last-commanded position table.

use crate::error::{MotionError, MotionResult};
use serde::{Deserialize, Serialize};

/// Servo channel index on the PWM controller (0..N-1).
pub type JointId = usize;

/// Servo pulse width in microseconds.
pub type Pulse = i32;

/// Lowest pulse width the servos accept.
pub const MIN_PULSE: Pulse = 375;

/// Highest pulse width the servos accept.
pub const MAX_PULSE: Pulse = 2500;

/// Channels on the PWM controller that carry a servo.
pub const JOINT_COUNT: usize = 7;

/// Clamp a requested pulse width into `[MIN_PULSE, MAX_PULSE]`. Out-of-range
/// requests are never rejected.
pub fn clamp_pulse(pulse: Pulse) -> Pulse {
    pulse.clamp(MIN_PULSE, MAX_PULSE)
}

/// Which PWM channel drives which part of the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmLayout {
    /// Swivel base.
    pub base: JointId,
    /// Shoulder, moved together with the elbow.
    pub shoulder: JointId,
    /// Elbow, moved together with the shoulder.
    pub elbow: JointId,
    pub gripper: JointId,
}

impl Default for ArmLayout {
    fn default() -> Self {
        Self {
            base: 0,
            shoulder: 1,
            elbow: 2,
            gripper: 6,
        }
    }
}

/// A full arm pose: base, shoulder, elbow and gripper pulse widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pose {
    pub base: Pulse,
    pub shoulder: Pulse,
    pub elbow: Pulse,
    pub gripper: Pulse,
}

impl Pose {
    /// Startup pose.
    pub const HOME: Pose = Pose {
        base: 1450,
        shoulder: 1825,
        elbow: 1450,
        gripper: 1950,
    };

    /// Shutdown pose.
    pub const PARK: Pose = Pose {
        base: 1500,
        shoulder: 1750,
        elbow: 1750,
        gripper: 1950,
    };
}

/// Last pulse width successfully written to each joint.
///
/// A joint starts out unknown and becomes known on its first successful write.
/// Only [`crate::MotionCoordinator`] mutates this table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorState {
    positions: Vec<Option<Pulse>>,
}

impl ActuatorState {
    pub fn new(joint_count: usize) -> Self {
        Self {
            positions: vec![None; joint_count],
        }
    }

    pub fn joint_count(&self) -> usize {
        self.positions.len()
    }

    /// Last written pulse width, or `None` if the joint was never driven.
    pub fn position(&self, joint: JointId) -> MotionResult<Option<Pulse>> {
        self.positions
            .get(joint)
            .copied()
            .ok_or(MotionError::UnknownJoint(joint))
    }

    /// Last written pulse width; fails if the joint was never driven.
    pub fn known_position(&self, joint: JointId) -> MotionResult<Pulse> {
        self.position(joint)?.ok_or(MotionError::UnknownPosition(joint))
    }

    pub(crate) fn check_joint(&self, joint: JointId) -> MotionResult<()> {
        if joint < self.positions.len() {
            Ok(())
        } else {
            Err(MotionError::UnknownJoint(joint))
        }
    }

    /// Record a successful write. The value must already be clamped.
    pub(crate) fn record(&mut self, joint: JointId, pulse: Pulse) {
        debug_assert!((MIN_PULSE..=MAX_PULSE).contains(&pulse));
        if let Some(slot) = self.positions.get_mut(joint) {
            *slot = Some(pulse);
        }
    }
}
