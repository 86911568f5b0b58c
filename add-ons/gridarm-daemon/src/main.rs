//! Grid arm daemon.
//!
//! Homes the arm, starts voice intake and spoken feedback, then serves
//! commands on a blocking worker until CTRL-C or until intake goes away.
//! The arm is parked on the way out; a second CTRL-C exits immediately.

use anyhow::{anyhow, Context};
use gridarm_core::{
    decision_api_key_from_env, ArmConfig, ControlLoop, ControlSettings, FileSnapshotSource, OpenRouterDecisionMaker,
};
use gridarm_motion::{ArmLayout, MotionCoordinator, RiSdkActuator};
use gridarm_voice::{
    command_queue, create_best_stt, create_best_tts, spawn_intake, FeedbackQueue, IntakeArbiter, IntakeWiring,
    MicrophoneSource, VadDetector,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[gridarm-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ArmConfig::load().context("load arm configuration")?;

    // Blocking HTTP clients and the servo SDK must live off the async runtime.
    let running = Arc::new(AtomicBool::new(true));
    let session_running = Arc::clone(&running);
    let mut session = tokio::task::spawn_blocking(move || run_session(config, &session_running));

    let joined = tokio::select! {
        joined = &mut session => {
            tracing::warn!("session ended on its own");
            joined
        }
        _ = tokio::signal::ctrl_c() => {
            // The current task stops at its next step or action boundary, then the arm parks.
            tracing::info!("CTRL-C received; stopping after the current move (press again to exit now)");
            running.store(false, Ordering::SeqCst);
            tokio::select! {
                joined = &mut session => joined,
                _ = tokio::signal::ctrl_c() => {
                    tracing::error!("second CTRL-C; exiting without parking the arm");
                    std::process::exit(130);
                }
            }
        }
    };

    joined.context("session thread panicked")??;
    tracing::info!("Grid arm daemon stopped");
    Ok(())
}

/// Bring up the arm, feedback and intake, serve commands until `running` is
/// cleared or intake goes away, then tear everything down.
fn run_session(config: ArmConfig, running: &AtomicBool) -> anyhow::Result<()> {
    let api_key = decision_api_key_from_env()
        .ok_or_else(|| anyhow!("no decision API key: set GRIDARM_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY"))?;
    let decision = OpenRouterDecisionMaker::new(&config.decision, api_key)?;
    let snapshots = FileSnapshotSource::new(&config.snapshot.image_path);

    let actuator = RiSdkActuator::load(config.hardware.clone())?;
    let mut motion =
        MotionCoordinator::new(actuator, ArmLayout::default())?.with_step_interval(config.motion.step_interval());
    motion.home(&config.motion.home).context("home arm")?;

    let feedback = Arc::new(FeedbackQueue::with_rodio(create_best_tts(&config.speech))?);
    let arbiter = IntakeArbiter::new();
    let (commands_tx, commands_rx) = command_queue();

    let wiring = IntakeWiring {
        arbiter: arbiter.clone(),
        speaking: feedback.clone(),
        commands: commands_tx,
    };
    let (audio, vad) = (config.audio.clone(), config.vad.clone());
    let mut intake = spawn_intake(
        move || Ok((MicrophoneSource::open(audio)?, VadDetector::new(vad)?)),
        create_best_stt(&config.speech),
        wiring,
        config.intake.clone(),
        config.audio.clone(),
    )
    .context("start voice intake")?;

    tracing::info!(
        model = %config.decision.model,
        snapshot = %config.snapshot.image_path.display(),
        max_steps = config.control.max_steps,
        "Grid arm daemon started"
    );

    let settings = ControlSettings::from_config(&config);
    let mut control = ControlLoop::new(motion, decision, snapshots, Arc::clone(&feedback), arbiter, settings);
    control.run(&commands_rx, running);

    intake.stop();
    feedback.clear();
    feedback.stop();
    Ok(())
}
