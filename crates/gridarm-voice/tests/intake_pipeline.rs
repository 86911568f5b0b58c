//! Intake pipeline across threads: intake loop, arbiter, feedback worker and command queue.
//!
//! The last test needs a microphone and network access and is ignored by default.

use gridarm_voice::{
    command_queue, spawn_intake, AudioConfig, FeedbackPlayback, FeedbackQueue, FrameSource, IntakeArbiter,
    IntakeConfig, IntakeWiring, PlaceholderStt, PlaceholderTts, Player, SegmenterConfig, SpeakingSignal,
    SpeechClassifier, VoiceResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FRAME: usize = 8;

/// Endless "two frames of speech, then silence" pattern.
struct ChattyRoom {
    n: usize,
}

impl FrameSource for ChattyRoom {
    fn read_frame(&mut self) -> VoiceResult<Vec<f32>> {
        self.n += 1;
        thread::sleep(Duration::from_millis(1));
        let value = if self.n % 6 < 2 { 0.5 } else { 0.0 };
        Ok(vec![value; FRAME])
    }
}

struct Threshold;

impl SpeechClassifier for Threshold {
    fn is_speech(&mut self, frame: &[f32]) -> VoiceResult<bool> {
        Ok(frame.iter().any(|s| s.abs() > 0.1))
    }
}

struct HeldPlayer {
    hold: Arc<AtomicBool>,
}

impl Player for HeldPlayer {
    fn start(&mut self, _audio: &[u8], _speed: f32) -> VoiceResult<()> {
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.hold.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.hold.store(false, Ordering::SeqCst);
    }
}

fn intake_config() -> IntakeConfig {
    IntakeConfig {
        segmenter: SegmenterConfig {
            silence_limit_frames: 2,
            min_utterance_frames: 2,
        },
        paused_poll_ms: 5,
        speaking_poll_ms: 5,
        read_backoff_ms: 5,
        ..Default::default()
    }
}

fn audio() -> AudioConfig {
    AudioConfig {
        frame_size: FRAME,
        ..Default::default()
    }
}

fn drain(rx: &gridarm_voice::CommandReceiver) -> usize {
    let mut n = 0;
    while rx.try_recv().is_some() {
        n += 1;
    }
    n
}

#[test]
fn paused_intake_produces_no_commands() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (tx, rx) = command_queue();
    let arbiter = IntakeArbiter::new();
    let wiring = IntakeWiring {
        arbiter: arbiter.clone(),
        speaking: Arc::new(AtomicBool::new(false)),
        commands: tx,
    };
    let mut handle = spawn_intake(
        || Ok((ChattyRoom { n: 0 }, Threshold)),
        Box::new(PlaceholderStt::with_response("move the cube to green")),
        wiring,
        intake_config(),
        audio(),
    )
    .unwrap();

    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.text, "move the cube to green");

    arbiter.pause();
    thread::sleep(Duration::from_millis(50));
    drain(&rx);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(drain(&rx), 0, "commands produced while paused");

    arbiter.resume();
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_some());

    handle.stop();
}

#[test]
fn intake_waits_for_feedback_to_finish() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let hold = Arc::new(AtomicBool::new(true));
    let player_hold = Arc::clone(&hold);
    let feedback = Arc::new(
        FeedbackQueue::spawn(Box::new(PlaceholderTts), move || Ok(HeldPlayer { hold: player_hold })).unwrap(),
    );

    assert!(feedback.speak("moving the cube", 1.1));
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !feedback.is_speaking() {
        assert!(std::time::Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }

    let (tx, rx) = command_queue();
    let speaking: Arc<dyn SpeakingSignal> = feedback.clone();
    let wiring = IntakeWiring {
        arbiter: IntakeArbiter::new(),
        speaking,
        commands: tx,
    };
    let mut handle = spawn_intake(
        || Ok((ChattyRoom { n: 0 }, Threshold)),
        Box::new(PlaceholderStt::with_response("put it back")),
        wiring,
        intake_config(),
        audio(),
    )
    .unwrap();

    assert!(rx.recv_timeout(Duration::from_millis(300)).is_none());

    hold.store(false, Ordering::SeqCst);
    feedback.wait_until_done();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().text, "put it back");

    handle.stop();
    feedback.stop();
}

#[test]
#[ignore] // Requires a microphone, a speech API key and someone speaking
fn live_microphone_intake() {
    use gridarm_voice::{create_best_stt, MicrophoneSource, SpeechConfig, VadConfig, VadDetector};

    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (tx, rx) = command_queue();
    let wiring = IntakeWiring {
        arbiter: IntakeArbiter::new(),
        speaking: Arc::new(AtomicBool::new(false)),
        commands: tx,
    };
    let audio = AudioConfig::default();
    let mic_config = audio.clone();
    let mut handle = spawn_intake(
        move || Ok((MicrophoneSource::open(mic_config)?, VadDetector::new(VadConfig::default())?)),
        create_best_stt(&SpeechConfig::default()),
        wiring,
        IntakeConfig::default(),
        audio,
    )
    .unwrap();

    println!("Say a command within 15 seconds...");
    match rx.recv_timeout(Duration::from_secs(15)) {
        Some(cmd) => println!("✅ Heard: {}", cmd.text),
        None => println!("⏱️ No command heard"),
    }
    handle.stop();
}
