//! The control loop: one command at a time, observe → decide → act.
//!
//! Voice intake stays paused for the whole task and is resumed by a drop
//! guard, so every exit path (completion, step limit, fatal error, panic)
//! reopens it. Hardware, snapshot and decision transport errors end the task;
//! malformed replies skip the step and unknown cells or heights skip the action.
//! Clearing the running flag stops a task at the next step or action boundary;
//! a trajectory already under way is finished first.

use crate::config::ArmConfig;
use crate::context::InteractionContext;
use crate::decision::{parse_decision, DecisionMaker};
use crate::error::{CoreError, CoreResult};
use crate::snapshot::SnapshotSource;
use chrono::{DateTime, Utc};
use gridarm_motion::{GridActionMapper, HardwareActuator, MotionCoordinator, Pose};
use gridarm_voice::{Command, CommandPoll, CommandReceiver, FeedbackPlayback, IntakeArbiter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Timing and limits for the control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    pub max_steps: usize,
    /// Pause after each executed action
    pub settle: Duration,
    /// Pause after feedback playback finished
    pub post_feedback_pause: Duration,
    pub feedback_speed: f32,
    pub command_poll: Duration,
    pub park: Pose,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self::from_config(&ArmConfig::default())
    }
}

impl ControlSettings {
    pub fn from_config(config: &ArmConfig) -> Self {
        Self {
            max_steps: config.control.max_steps,
            settle: config.motion.settle(),
            post_feedback_pause: config.motion.post_feedback_pause(),
            feedback_speed: config.control.feedback_speed,
            command_poll: Duration::from_millis(config.control.command_poll_ms),
            park: config.motion.park,
        }
    }

    /// Same limits with every pause set to zero.
    pub fn without_delays(mut self) -> Self {
        self.settle = Duration::ZERO;
        self.post_feedback_pause = Duration::ZERO;
        self
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The decision-maker returned no actions.
    Completed,
    /// Ran out of steps.
    StepLimit,
    /// A task-fatal error.
    Aborted(String),
    /// The running flag was cleared mid-task.
    Interrupted,
}

/// Summary of one handled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub instruction: String,
    pub steps: usize,
    pub actions_executed: usize,
    pub actions_skipped: usize,
    pub malformed_steps: usize,
    pub outcome: TaskOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskReport {
    fn new(instruction: &str) -> Self {
        Self {
            instruction: instruction.to_string(),
            steps: 0,
            actions_executed: 0,
            actions_skipped: 0,
            malformed_steps: 0,
            outcome: TaskOutcome::StepLimit,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Wall-clock duration, once finished.
    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at.map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Aborted(_))
    }
}

/// Keeps intake paused while alive.
struct IntakePause {
    arbiter: IntakeArbiter,
}

impl IntakePause {
    fn hold(arbiter: &IntakeArbiter) -> Self {
        arbiter.pause();
        Self {
            arbiter: arbiter.clone(),
        }
    }
}

impl Drop for IntakePause {
    fn drop(&mut self) {
        self.arbiter.resume();
    }
}

enum StepFlow {
    Continue,
    Done,
    Interrupted,
}

/// Runs commands against the arm.
pub struct ControlLoop<A, D, S, F>
where
    A: HardwareActuator,
    D: DecisionMaker,
    S: SnapshotSource,
    F: FeedbackPlayback,
{
    motion: MotionCoordinator<A>,
    mapper: GridActionMapper,
    decision: D,
    snapshots: S,
    feedback: F,
    arbiter: IntakeArbiter,
    settings: ControlSettings,
}

impl<A, D, S, F> ControlLoop<A, D, S, F>
where
    A: HardwareActuator,
    D: DecisionMaker,
    S: SnapshotSource,
    F: FeedbackPlayback,
{
    pub fn new(
        motion: MotionCoordinator<A>,
        decision: D,
        snapshots: S,
        feedback: F,
        arbiter: IntakeArbiter,
        settings: ControlSettings,
    ) -> Self {
        Self {
            motion,
            mapper: GridActionMapper::new(),
            decision,
            snapshots,
            feedback,
            arbiter,
            settings,
        }
    }

    pub fn motion(&self) -> &MotionCoordinator<A> {
        &self.motion
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Carry out one command with intake paused throughout. Stops early once
    /// `running` is cleared.
    pub fn handle_command(&mut self, command: &Command, running: &AtomicBool) -> TaskReport {
        let _pause = IntakePause::hold(&self.arbiter);
        let mut report = TaskReport::new(&command.text);
        let mut context = InteractionContext::new();
        info!("🤖 Processing command: {}", command.text);

        for step in 0..self.settings.max_steps {
            if !running.load(Ordering::SeqCst) {
                report.outcome = TaskOutcome::Interrupted;
                break;
            }
            report.steps = step + 1;
            match self.run_step(step, &command.text, &mut context, &mut report, running) {
                Ok(StepFlow::Continue) => {}
                Ok(StepFlow::Done) => {
                    report.outcome = TaskOutcome::Completed;
                    break;
                }
                Ok(StepFlow::Interrupted) => {
                    report.outcome = TaskOutcome::Interrupted;
                    break;
                }
                Err(e) if !e.is_task_fatal() => {
                    warn!(step, "Skipping step: {}", e);
                    report.malformed_steps += 1;
                }
                Err(e) => {
                    error!(step, "Task aborted: {}", e);
                    report.outcome = TaskOutcome::Aborted(e.to_string());
                    break;
                }
            }
        }

        report.finished_at = Some(Utc::now());
        info!(
            steps = report.steps,
            elapsed_ms = report.elapsed_ms().unwrap_or_default(),
            executed = report.actions_executed,
            skipped = report.actions_skipped,
            outcome = ?report.outcome,
            "✅ Task finished"
        );
        report
    }

    fn run_step(
        &mut self,
        step: usize,
        instruction: &str,
        context: &mut InteractionContext,
        report: &mut TaskReport,
        running: &AtomicBool,
    ) -> CoreResult<StepFlow> {
        let snapshot = self.snapshots.capture()?;
        context.push_observation((step == 0).then_some(instruction), snapshot);

        let reply = self.decision.decide(context)?;
        context.push_reply(reply.as_str());
        let decision = parse_decision(&reply)?;
        info!(step, actions = decision.actions.len(), "👁️ {}", decision.observation);

        let spoken = decision.spoken_feedback.trim();
        if !spoken.is_empty() && !self.feedback.speak(spoken, self.settings.feedback_speed) {
            warn!("Feedback playback unavailable; continuing silently");
        }

        if decision.actions.is_empty() {
            return Ok(StepFlow::Done);
        }

        for action in &decision.actions {
            if !running.load(Ordering::SeqCst) {
                info!(step, "Stop requested; leaving remaining actions");
                return Ok(StepFlow::Interrupted);
            }
            let target = match self.mapper.resolve(&action.target_square, &action.target_arm_height, &action.gripper) {
                Ok(target) => target,
                Err(e) => {
                    warn!(?action, "Skipping action: {}", e);
                    report.actions_skipped += 1;
                    continue;
                }
            };
            self.motion.move_to(&target).map_err(CoreError::from)?;
            report.actions_executed += 1;
            thread::sleep(self.settings.settle);
        }

        self.feedback.wait_until_done();
        thread::sleep(self.settings.post_feedback_pause);
        Ok(StepFlow::Continue)
    }

    /// Move to the park pose.
    pub fn park(&mut self) -> CoreResult<()> {
        let pose = self.settings.park;
        self.motion.park(&pose)?;
        Ok(())
    }

    fn park_best_effort(&mut self) {
        if let Err(e) = self.park() {
            error!("Parking failed: {}", e);
        }
    }

    /// Serve commands until `running` is cleared or the queue closes, then park.
    pub fn run(&mut self, commands: &CommandReceiver, running: &AtomicBool) {
        info!("🚀 Control loop ready for commands");
        while running.load(Ordering::SeqCst) {
            match commands.poll(self.settings.command_poll) {
                CommandPoll::Ready(command) => {
                    let report = self.handle_command(&command, running);
                    if report.is_aborted() {
                        self.park_best_effort();
                    }
                }
                CommandPoll::Empty => {}
                CommandPoll::Closed => {
                    warn!("Command queue closed; stopping control loop");
                    break;
                }
            }
        }
        info!("🛑 Control loop stopping, parking arm");
        self.park_best_effort();
    }
}
