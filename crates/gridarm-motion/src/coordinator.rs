//! Synchronized multi-joint motion.
//!
//! Every write is clamped to `[MIN_PULSE, MAX_PULSE]` and recorded in the
//! [`ActuatorState`] only after the hardware accepted it. Moves are blocking:
//! each step writes, then sleeps for the step interval. A failed write aborts
//! the move immediately and is never retried.

use crate::error::{MotionError, MotionResult};
use crate::grid::MotionTarget;
use crate::hardware::HardwareActuator;
use crate::joint::{clamp_pulse, ActuatorState, ArmLayout, JointId, Pose, Pulse};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Pause between single-pulse steps.
pub const DEFAULT_STEP_INTERVAL: Duration = Duration::from_millis(10);

/// Owns the actuator and the position table; the only writer of either.
pub struct MotionCoordinator<A: HardwareActuator> {
    actuator: A,
    state: ActuatorState,
    layout: ArmLayout,
    step_interval: Duration,
}

impl<A: HardwareActuator> MotionCoordinator<A> {
    /// Initialize the actuator and take ownership of it.
    pub fn new(mut actuator: A, layout: ArmLayout) -> MotionResult<Self> {
        let joint_count = actuator.joint_count();
        for joint in [layout.base, layout.shoulder, layout.elbow, layout.gripper] {
            if joint >= joint_count {
                return Err(MotionError::Configuration(format!(
                    "layout references joint {} but the controller has {} channels",
                    joint, joint_count
                )));
            }
        }
        actuator.initialize()?;
        Ok(Self {
            actuator,
            state: ActuatorState::new(joint_count),
            layout,
            step_interval: DEFAULT_STEP_INTERVAL,
        })
    }

    /// Override the inter-step pause (tests use `Duration::ZERO`).
    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    pub fn state(&self) -> &ActuatorState {
        &self.state
    }

    pub fn layout(&self) -> ArmLayout {
        self.layout
    }

    fn write(&mut self, joint: JointId, pulse: Pulse) -> MotionResult<()> {
        self.state.check_joint(joint)?;
        let pulse = clamp_pulse(pulse);
        self.actuator.write(joint, pulse)?;
        self.state.record(joint, pulse);
        Ok(())
    }

    fn pause(&self) {
        if !self.step_interval.is_zero() {
            thread::sleep(self.step_interval);
        }
    }

    /// Single direct write, no stepping. Establishes a known position.
    pub fn move_joint(&mut self, joint: JointId, pulse: Pulse) -> MotionResult<()> {
        self.write(joint, pulse)
    }

    /// Step `joint` one pulse at a time toward `target`, then write `target`
    /// exactly. No writes at all if the joint is already there.
    pub fn move_joint_slow(&mut self, joint: JointId, target: Pulse) -> MotionResult<()> {
        let target = clamp_pulse(target);
        let current = self.state.known_position(joint)?;
        if current == target {
            return Ok(());
        }
        debug!(joint, from = current, to = target, "slow move");
        let direction = (target - current).signum();
        let mut pulse = current;
        while pulse != target {
            self.write(joint, pulse)?;
            self.pause();
            pulse += direction;
        }
        self.write(joint, target)
    }

    /// Move shoulder and elbow so both arrive together, with the base moved
    /// before the pair when the shoulder target is at or below its current
    /// position and after it otherwise.
    ///
    /// Returns the number of interpolation steps, `floor(max(|dA|, |dB|))`.
    pub fn move_synchronized(
        &mut self,
        base_target: Pulse,
        shoulder_target: Pulse,
        elbow_target: Pulse,
    ) -> MotionResult<usize> {
        let ArmLayout { base, shoulder, elbow, .. } = self.layout;
        let target_a = clamp_pulse(shoulder_target);
        let target_b = clamp_pulse(elbow_target);
        let start_a = self.state.known_position(shoulder)?;
        let start_b = self.state.known_position(elbow)?;

        let base_first = target_a <= start_a;
        if base_first {
            self.move_joint_slow(base, base_target)?;
        }

        let dist_a = f64::from((target_a - start_a).abs());
        let dist_b = f64::from((target_b - start_b).abs());
        let max_dist = dist_a.max(dist_b);
        let mut steps = 0;

        if max_dist > 0.0 {
            let step_a = f64::from(target_a - start_a) / max_dist;
            let step_b = f64::from(target_b - start_b) / max_dist;
            steps = max_dist.floor() as usize;
            debug!(
                from = ?(start_a, start_b),
                to = ?(target_a, target_b),
                steps,
                base_first,
                "synchronized move"
            );
            for i in 0..steps {
                let i = i as f64;
                let pos_a = (f64::from(start_a) + step_a * i) as Pulse;
                let pos_b = (f64::from(start_b) + step_b * i) as Pulse;
                self.write(shoulder, pos_a)?;
                self.write(elbow, pos_b)?;
                self.pause();
            }
            // Exact final writes absorb interpolation rounding.
            self.write(shoulder, target_a)?;
            self.write(elbow, target_b)?;
        }

        if !base_first {
            self.move_joint_slow(base, base_target)?;
        }
        Ok(steps)
    }

    /// Positioning joints via [`Self::move_synchronized`], then the gripper slowly.
    pub fn move_to(&mut self, target: &MotionTarget) -> MotionResult<()> {
        let [base, shoulder, elbow] = target.positioning;
        self.move_synchronized(base, shoulder, elbow)?;
        self.move_joint_slow(self.layout.gripper, target.gripper)
    }

    /// Startup: direct writes to establish every pose joint, then a settling
    /// synchronized move to the same pose.
    pub fn home(&mut self, pose: &Pose) -> MotionResult<()> {
        let ArmLayout { base, shoulder, elbow, gripper } = self.layout;
        self.write(base, pose.base)?;
        self.write(shoulder, pose.shoulder)?;
        self.write(elbow, pose.elbow)?;
        self.write(gripper, pose.gripper)?;
        self.move_synchronized(pose.base, pose.shoulder, pose.elbow)?;
        self.move_joint_slow(gripper, pose.gripper)?;
        info!(?pose, "arm homed");
        Ok(())
    }

    /// Safe shutdown pose: synchronized move, then a direct gripper write.
    pub fn park(&mut self, pose: &Pose) -> MotionResult<()> {
        self.move_synchronized(pose.base, pose.shoulder, pose.elbow)?;
        self.write(self.layout.gripper, pose.gripper)?;
        info!(?pose, "arm parked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::{MAX_PULSE, MIN_PULSE};
    use crate::mock::MockActuator;

    fn coordinator(mock: &MockActuator) -> MotionCoordinator<MockActuator> {
        MotionCoordinator::new(mock.clone(), ArmLayout::default())
            .unwrap()
            .with_step_interval(Duration::ZERO)
    }

    fn homed(mock: &MockActuator, pose: Pose) -> MotionCoordinator<MockActuator> {
        let mut c = coordinator(mock);
        c.move_joint(0, pose.base).unwrap();
        c.move_joint(1, pose.shoulder).unwrap();
        c.move_joint(2, pose.elbow).unwrap();
        c.move_joint(6, pose.gripper).unwrap();
        mock.clear();
        c
    }

    #[test]
    fn new_initializes_actuator() {
        let mock = MockActuator::new(7);
        let _c = coordinator(&mock);
        assert!(mock.is_initialized());
    }

    #[test]
    fn init_failure_is_configuration_error() {
        let mock = MockActuator::new(7).fail_init();
        let err = MotionCoordinator::new(mock, ArmLayout::default()).err().unwrap();
        assert!(matches!(err, MotionError::Configuration(_)));
    }

    #[test]
    fn layout_outside_controller_is_rejected() {
        let mock = MockActuator::new(4);
        let err = MotionCoordinator::new(mock.clone(), ArmLayout::default()).err().unwrap();
        assert!(matches!(err, MotionError::Configuration(_)));
        assert!(!mock.is_initialized());
    }

    #[test]
    fn direct_move_is_clamped_and_recorded() {
        let mock = MockActuator::new(7);
        let mut c = coordinator(&mock);
        c.move_joint(3, 100).unwrap();
        c.move_joint(4, 4000).unwrap();
        assert_eq!(mock.writes(), vec![(3, MIN_PULSE), (4, MAX_PULSE)]);
        assert_eq!(c.state().known_position(3).unwrap(), MIN_PULSE);
        assert_eq!(c.state().known_position(4).unwrap(), MAX_PULSE);
    }

    #[test]
    fn unknown_joint_is_rejected() {
        let mock = MockActuator::new(7);
        let mut c = coordinator(&mock);
        assert_eq!(c.move_joint(9, 1500), Err(MotionError::UnknownJoint(9)));
        assert_eq!(mock.write_count(), 0);
    }

    #[test]
    fn slow_move_steps_one_pulse_at_a_time() {
        let mock = MockActuator::new(7);
        let mut c = coordinator(&mock);
        c.move_joint(6, 1650).unwrap();
        mock.clear();

        c.move_joint_slow(6, 1655).unwrap();
        assert_eq!(mock.writes_to(6), vec![1650, 1651, 1652, 1653, 1654, 1655]);

        mock.clear();
        c.move_joint_slow(6, 1652).unwrap();
        assert_eq!(mock.writes_to(6), vec![1655, 1654, 1653, 1652]);
        assert_eq!(c.state().known_position(6).unwrap(), 1652);
    }

    #[test]
    fn slow_move_to_current_position_writes_nothing() {
        let mock = MockActuator::new(7);
        let mut c = coordinator(&mock);
        c.move_joint(6, 1950).unwrap();
        mock.clear();
        c.move_joint_slow(6, 1950).unwrap();
        assert_eq!(mock.write_count(), 0);
    }

    #[test]
    fn slow_move_needs_known_position() {
        let mock = MockActuator::new(7);
        let mut c = coordinator(&mock);
        assert_eq!(c.move_joint_slow(6, 1950), Err(MotionError::UnknownPosition(6)));
    }

    #[test]
    fn slow_move_clamps_target() {
        let mock = MockActuator::new(7);
        let mut c = coordinator(&mock);
        c.move_joint(6, 2497).unwrap();
        mock.clear();
        c.move_joint_slow(6, 3000).unwrap();
        assert_eq!(mock.writes_to(6), vec![2497, 2498, 2499, 2500]);
    }

    #[test]
    fn sync_move_lands_exactly_and_counts_steps() {
        let mock = MockActuator::new(7);
        let mut c = homed(&mock, Pose::HOME);
        // shoulder 1825 -> 1625 (200), elbow 1450 -> 1850 (400)
        let steps = c.move_synchronized(1450, 1625, 1850).unwrap();
        assert_eq!(steps, 400);
        let shoulder = mock.writes_to(1);
        let elbow = mock.writes_to(2);
        assert_eq!(shoulder.len(), 401);
        assert_eq!(elbow.len(), 401);
        assert_eq!(*shoulder.last().unwrap(), 1625);
        assert_eq!(*elbow.last().unwrap(), 1850);
        // the shorter joint advances half a pulse per step
        assert_eq!(&shoulder[..3], &[1825, 1824, 1824]);
        assert_eq!(c.state().known_position(1).unwrap(), 1625);
        assert_eq!(c.state().known_position(2).unwrap(), 1850);
    }

    #[test]
    fn base_moves_first_when_shoulder_descends() {
        let mock = MockActuator::new(7);
        let mut c = homed(&mock, Pose::HOME);
        c.move_synchronized(1460, 1800, 1450).unwrap();
        let writes = mock.writes();
        assert_eq!(writes.first().unwrap().0, 0);
        assert_eq!(writes.last().unwrap().0, 2);
    }

    #[test]
    fn base_moves_last_when_shoulder_rises() {
        let mock = MockActuator::new(7);
        let mut c = homed(&mock, Pose::HOME);
        c.move_synchronized(1460, 1900, 1450).unwrap();
        let writes = mock.writes();
        assert_eq!(writes.first().unwrap().0, 1);
        assert_eq!(*writes.last().unwrap(), (0, 1460));
    }

    #[test]
    fn zero_distance_still_moves_base() {
        let mock = MockActuator::new(7);
        let mut c = homed(&mock, Pose::HOME);
        let steps = c.move_synchronized(1453, 1825, 1450).unwrap();
        assert_eq!(steps, 0);
        assert_eq!(mock.writes(), vec![(0, 1450), (0, 1451), (0, 1452), (0, 1453)]);
    }

    #[test]
    fn failed_write_aborts_move_without_recording() {
        let mock = MockActuator::new(7).fail_on_write(10);
        let mut c = homed(&mock, Pose::HOME);
        // homing writes were cleared, so the 10th write of this move fails
        let err = c.move_synchronized(1450, 1700, 1450).unwrap_err();
        assert!(matches!(err, MotionError::HardwareWrite { .. }));
        assert_eq!(mock.write_count(), 9);
        let last_shoulder = *mock.writes_to(1).last().unwrap();
        assert_eq!(c.state().known_position(1).unwrap(), last_shoulder);
    }

    #[test]
    fn move_to_drives_gripper_after_positioning() {
        let mock = MockActuator::new(7);
        let mut c = homed(&mock, Pose::HOME);
        let target = MotionTarget {
            positioning: [1450, 1825, 1450],
            gripper: 1947,
        };
        c.move_to(&target).unwrap();
        assert_eq!(mock.writes(), vec![(6, 1950), (6, 1949), (6, 1948), (6, 1947)]);
    }

    #[test]
    fn home_then_park() {
        let mock = MockActuator::new(7);
        let mut c = coordinator(&mock);
        c.home(&Pose::HOME).unwrap();
        assert_eq!(c.state().known_position(0).unwrap(), 1450);
        assert_eq!(c.state().known_position(6).unwrap(), 1950);
        c.park(&Pose::PARK).unwrap();
        assert_eq!(c.state().known_position(0).unwrap(), 1500);
        assert_eq!(c.state().known_position(1).unwrap(), 1750);
        assert_eq!(c.state().known_position(2).unwrap(), 1750);
        assert_eq!(*mock.writes().last().unwrap(), (6, 1950));
    }
}
