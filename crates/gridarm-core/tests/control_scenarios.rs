//! Control loop against the mock actuator: task-fatal failures, pause
//! discipline, stop requests and the serve-until-closed session loop.

use gridarm_core::{
    ControlLoop, ControlSettings, CoreError, CoreResult, DecisionMaker, InteractionContext, Snapshot, SnapshotSource,
    TaskOutcome,
};
use gridarm_motion::{ArmLayout, MockActuator, MotionCoordinator, Pose};
use gridarm_voice::{command_queue, Command, FeedbackPlayback, IntakeArbiter, SpeakingSignal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Visits green, blue and red (raised) in turn, one cell per step. Arms
/// write failures on the mock when step `fail_from_step` is requested.
struct Tour {
    mock: MockActuator,
    calls: usize,
    fail_from_step: Option<usize>,
}

impl Tour {
    fn new(mock: &MockActuator, fail_from_step: Option<usize>) -> Self {
        Self {
            mock: mock.clone(),
            calls: 0,
            fail_from_step,
        }
    }
}

impl DecisionMaker for Tour {
    fn decide(&mut self, _context: &InteractionContext) -> CoreResult<String> {
        self.calls += 1;
        if self.fail_from_step == Some(self.calls) {
            let _ = self.mock.clone().fail_on_write(1);
        }
        let cell = ["green", "blue", "red"][(self.calls - 1) % 3];
        Ok(format!(
            r#"{{"observation": "step {}", "actions": [{{"target_square": "{}", "target_arm_height": "raised", "gripper": "open"}}], "spoken_feedback": "Moving."}}"#,
            self.calls, cell
        ))
    }
}

struct StillCamera;

impl SnapshotSource for StillCamera {
    fn capture(&mut self) -> CoreResult<Snapshot> {
        Ok(Snapshot::from_bytes("image/png", b"frame"))
    }
}

struct SilentFeedback;

impl SpeakingSignal for SilentFeedback {
    fn is_speaking(&self) -> bool {
        false
    }
}

impl FeedbackPlayback for SilentFeedback {
    fn speak(&self, _text: &str, _speed: f32) -> bool {
        true
    }

    fn wait_until_done(&self) {}
}

fn homed(mock: &MockActuator) -> MotionCoordinator<MockActuator> {
    let mut motion = MotionCoordinator::new(mock.clone(), ArmLayout::default())
        .unwrap()
        .with_step_interval(Duration::ZERO);
    motion.home(&Pose::HOME).unwrap();
    mock.clear();
    motion
}

fn settings() -> ControlSettings {
    ControlSettings {
        command_poll: Duration::from_millis(10),
        ..ControlSettings::default().without_delays()
    }
}

#[test]
fn hardware_failure_on_step_three_aborts_and_resumes_intake() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mock = MockActuator::new(7);
    let arbiter = IntakeArbiter::new();
    let mut lp = ControlLoop::new(
        homed(&mock),
        Tour::new(&mock, Some(3)),
        StillCamera,
        Arc::new(SilentFeedback),
        arbiter.clone(),
        settings(),
    );

    let report = lp.handle_command(&Command::new("visit every square"), &AtomicBool::new(true));

    assert_eq!(report.steps, 3);
    assert_eq!(report.actions_executed, 2);
    assert!(report.is_aborted());
    match &report.outcome {
        TaskOutcome::Aborted(reason) => assert!(reason.contains("Hardware write failed"), "{}", reason),
        other => panic!("expected abort, got {:?}", other),
    }
    assert!(!arbiter.is_paused(), "intake must be resumed after a fatal error");
    // Red's base pulse was never reached.
    assert_ne!(lp.motion().state().position(0).unwrap(), Some(1200));
}

#[test]
fn transport_error_parks_then_serves_next_command() {
    struct FlakyThenFine {
        mock: MockActuator,
        calls: usize,
        shoulder_on_retry: Arc<Mutex<Option<i32>>>,
    }

    impl DecisionMaker for FlakyThenFine {
        fn decide(&mut self, _context: &InteractionContext) -> CoreResult<String> {
            self.calls += 1;
            if self.calls == 1 {
                return Err(CoreError::Decision("connection reset".to_string()));
            }
            *self.shoulder_on_retry.lock().unwrap() = self.mock.writes_to(1).last().copied();
            Ok(r#"{"actions": []}"#.to_string())
        }
    }

    let mock = MockActuator::new(7);
    let arbiter = IntakeArbiter::new();
    let shoulder_on_retry = Arc::new(Mutex::new(None));
    let mut lp = ControlLoop::new(
        homed(&mock),
        FlakyThenFine {
            mock: mock.clone(),
            calls: 0,
            shoulder_on_retry: shoulder_on_retry.clone(),
        },
        StillCamera,
        Arc::new(SilentFeedback),
        arbiter.clone(),
        settings(),
    );

    let (tx, rx) = command_queue();
    tx.push(Command::new("first try"));
    tx.push(Command::new("second try"));
    drop(tx);

    lp.run(&rx, &AtomicBool::new(true));

    // The failed task parked the arm before the second command was served.
    assert_eq!(*shoulder_on_retry.lock().unwrap(), Some(Pose::PARK.shoulder));
    assert!(!arbiter.is_paused());
    let state = lp.motion().state();
    assert_eq!(state.position(0).unwrap(), Some(Pose::PARK.base));
    assert_eq!(state.position(2).unwrap(), Some(Pose::PARK.elbow));
    assert_eq!(state.position(6).unwrap(), Some(Pose::PARK.gripper));
}

#[test]
fn run_parks_on_exit_after_tasks() {
    let mock = MockActuator::new(7);
    let mut lp = ControlLoop::new(
        homed(&mock),
        Tour::new(&mock, None),
        StillCamera,
        Arc::new(SilentFeedback),
        IntakeArbiter::new(),
        ControlSettings {
            max_steps: 2,
            ..settings()
        },
    );

    let (tx, rx) = command_queue();
    tx.push(Command::new("wander"));
    drop(tx);
    lp.run(&rx, &AtomicBool::new(true));

    let writes = mock.writes();
    // base ends on the park pose, gripper written directly last
    assert_eq!(mock.writes_to(0).last(), Some(&Pose::PARK.base));
    assert_eq!(writes.last(), Some(&(6, Pose::PARK.gripper)));
}

#[test]
fn cleared_running_flag_stops_without_serving() {
    let mock = MockActuator::new(7);
    let mut lp = ControlLoop::new(
        homed(&mock),
        Tour::new(&mock, None),
        StillCamera,
        Arc::new(SilentFeedback),
        IntakeArbiter::new(),
        settings(),
    );
    let (tx, rx) = command_queue();
    tx.push(Command::new("never handled"));

    lp.run(&rx, &AtomicBool::new(false));
    assert_eq!(rx.try_recv().map(|c| c.text), Some("never handled".to_string()));
    // parked on exit
    assert_eq!(lp.motion().state().position(1).unwrap(), Some(Pose::PARK.shoulder));
    drop(tx);
}

#[test]
fn hardware_abort_in_session_parks_before_next_command() {
    /// Green, blue, then red with one rejected write; records the base pulse
    /// seen when the next command starts.
    struct GlitchOnThird {
        mock: MockActuator,
        calls: usize,
        base_on_next_command: Arc<Mutex<Option<i32>>>,
    }

    impl DecisionMaker for GlitchOnThird {
        fn decide(&mut self, context: &InteractionContext) -> CoreResult<String> {
            self.calls += 1;
            match self.calls {
                3 => {
                    let _ = self.mock.clone().fail_next_writes(1);
                }
                4 => {
                    assert_eq!(context.len(), 1, "fourth call opens a new command");
                    *self.base_on_next_command.lock().unwrap() = self.mock.writes_to(0).last().copied();
                    return Ok(r#"{"actions": []}"#.to_string());
                }
                _ => {}
            }
            let cell = ["green", "blue", "red"][(self.calls - 1) % 3];
            Ok(format!(
                r#"{{"actions": [{{"target_square": "{}", "target_arm_height": "raised", "gripper": "open"}}]}}"#,
                cell
            ))
        }
    }

    let mock = MockActuator::new(7);
    let arbiter = IntakeArbiter::new();
    let base_on_next_command = Arc::new(Mutex::new(None));
    let mut lp = ControlLoop::new(
        homed(&mock),
        GlitchOnThird {
            mock: mock.clone(),
            calls: 0,
            base_on_next_command: base_on_next_command.clone(),
        },
        StillCamera,
        Arc::new(SilentFeedback),
        arbiter.clone(),
        settings(),
    );

    let (tx, rx) = command_queue();
    tx.push(Command::new("visit every square"));
    tx.push(Command::new("anything else?"));
    drop(tx);
    lp.run(&rx, &AtomicBool::new(true));

    // The red move failed on its first base write, leaving the base on blue (1700).
    // The park after the abort brought it back before the second command.
    assert_eq!(*base_on_next_command.lock().unwrap(), Some(Pose::PARK.base));
    assert!(!arbiter.is_paused());
    let state = lp.motion().state();
    assert_eq!(state.position(1).unwrap(), Some(Pose::PARK.shoulder));
    assert_eq!(state.position(2).unwrap(), Some(Pose::PARK.elbow));
    assert_eq!(mock.writes().last(), Some(&(6, Pose::PARK.gripper)));
}

#[test]
fn stop_request_skips_remaining_actions_and_parks() {
    /// Clears the running flag on its first call and keeps asking for motion.
    struct StopsAfterFirst {
        running: Arc<AtomicBool>,
        calls: Arc<Mutex<usize>>,
    }

    impl DecisionMaker for StopsAfterFirst {
        fn decide(&mut self, _context: &InteractionContext) -> CoreResult<String> {
            *self.calls.lock().unwrap() += 1;
            self.running.store(false, Ordering::SeqCst);
            Ok(r#"{"actions": [{"target_square": "blue", "target_arm_height": "raised", "gripper": "open"}]}"#.to_string())
        }
    }

    let mock = MockActuator::new(7);
    let arbiter = IntakeArbiter::new();
    let running = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(Mutex::new(0));
    let mut lp = ControlLoop::new(
        homed(&mock),
        StopsAfterFirst {
            running: running.clone(),
            calls: calls.clone(),
        },
        StillCamera,
        Arc::new(SilentFeedback),
        arbiter.clone(),
        settings(),
    );

    let (tx, rx) = command_queue();
    tx.push(Command::new("keep moving"));
    tx.push(Command::new("never reached"));
    lp.run(&rx, &running);

    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(!arbiter.is_paused());
    // The blue move was never started; the only motion is the park from home.
    assert!(!mock.writes_to(0).contains(&1700));
    let state = lp.motion().state();
    assert_eq!(state.position(0).unwrap(), Some(Pose::PARK.base));
    assert_eq!(state.position(1).unwrap(), Some(Pose::PARK.shoulder));
    assert_eq!(state.position(2).unwrap(), Some(Pose::PARK.elbow));
    assert_eq!(rx.try_recv().map(|c| c.text), Some("never reached".to_string()));
    drop(tx);
}

#[test]
fn stop_request_reports_interrupted() {
    struct HaltingPlanner(Arc<AtomicBool>);

    impl DecisionMaker for HaltingPlanner {
        fn decide(&mut self, _context: &InteractionContext) -> CoreResult<String> {
            self.0.store(false, Ordering::SeqCst);
            Ok(r#"{"actions": [{"target_square": "cyan", "target_arm_height": "lowered", "gripper": "close"}]}"#.to_string())
        }
    }

    let mock = MockActuator::new(7);
    let running = Arc::new(AtomicBool::new(true));
    let mut lp = ControlLoop::new(
        homed(&mock),
        HaltingPlanner(running.clone()),
        StillCamera,
        Arc::new(SilentFeedback),
        IntakeArbiter::new(),
        settings(),
    );

    let report = lp.handle_command(&Command::new("stack them"), &running);
    assert_eq!(report.outcome, TaskOutcome::Interrupted);
    assert_eq!(report.steps, 1);
    assert_eq!(report.actions_executed, 0);
    assert!(!report.is_aborted());
    assert_eq!(mock.write_count(), 0);
}
