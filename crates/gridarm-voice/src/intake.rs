//! The audio-intake loop: frames in, commands out.
//!
//! Each tick checks the arbiter, then the feedback speaking signal, then reads
//! one frame, classifies it and feeds the segmenter. Completed utterances are
//! transcribed on this thread and accepted transcripts are pushed to the
//! command queue. Nothing here ever blocks the control loop.

use crate::arbiter::IntakeArbiter;
use crate::audio::{AudioConfig, FrameSource};
use crate::error::{VoiceError, VoiceResult};
use crate::feedback::SpeakingSignal;
use crate::queue::{CommandSender, DEFAULT_COMMAND_SPEED};
use crate::segmenter::{SegmentEvent, SegmenterConfig, SpeechSegmenter};
use crate::stt::{accept_transcript, SttBackend};
use crate::vad::SpeechClassifier;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

fn default_paused_poll_ms() -> u64 {
    100
}

fn default_speaking_poll_ms() -> u64 {
    500
}

fn default_read_backoff_ms() -> u64 {
    100
}

fn default_min_command_chars() -> usize {
    3
}

fn default_command_speed() -> f32 {
    DEFAULT_COMMAND_SPEED
}

/// Intake loop timing and acceptance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(flatten)]
    pub segmenter: SegmenterConfig,

    /// Idle interval while the arbiter is paused
    #[serde(default = "default_paused_poll_ms")]
    pub paused_poll_ms: u64,

    /// Idle interval while feedback audio is playing
    #[serde(default = "default_speaking_poll_ms")]
    pub speaking_poll_ms: u64,

    /// Wait after a failed frame read before trying again
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,

    /// Transcripts must be longer than this many characters to become commands
    #[serde(default = "default_min_command_chars")]
    pub min_command_chars: usize,

    /// Speed attached to every produced command
    #[serde(default = "default_command_speed")]
    pub command_speed: f32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            paused_poll_ms: default_paused_poll_ms(),
            speaking_poll_ms: default_speaking_poll_ms(),
            read_backoff_ms: default_read_backoff_ms(),
            min_command_chars: default_min_command_chars(),
            command_speed: default_command_speed(),
        }
    }
}

impl IntakeConfig {
    /// Same settings with every idle interval set to zero.
    pub fn without_delays(mut self) -> Self {
        self.paused_poll_ms = 0;
        self.speaking_poll_ms = 0;
        self.read_backoff_ms = 0;
        self
    }
}

/// Shared state the intake loop reads from and writes to.
#[derive(Clone)]
pub struct IntakeWiring {
    pub arbiter: IntakeArbiter,
    pub speaking: Arc<dyn SpeakingSignal>,
    pub commands: CommandSender,
}

/// What one tick of the loop did.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeTick {
    /// Arbiter paused; no frame consumed.
    Paused,
    /// Feedback audio playing; no frame consumed.
    FeedbackPlaying,
    /// The frame source failed; backed off.
    ReadFailed,
    /// Frame consumed, nothing completed.
    Listening,
    /// Speech onset.
    UtteranceStarted,
    /// Utterance below the minimum length.
    UtteranceDiscarded,
    /// Utterance transcribed but the text was too short.
    TranscriptRejected(String),
    /// Transcription failed; the utterance is lost.
    TranscriptionFailed,
    /// A command was queued.
    CommandQueued(String),
    /// A command was transcribed but the control loop is gone.
    CommandDropped(String),
}

/// The intake loop over one frame source and classifier.
pub struct IntakeLoop<S, C> {
    source: S,
    classifier: C,
    segmenter: SpeechSegmenter,
    stt: Box<dyn SttBackend>,
    wiring: IntakeWiring,
    config: IntakeConfig,
}

impl<S: FrameSource, C: SpeechClassifier> IntakeLoop<S, C> {
    pub fn new(
        source: S,
        classifier: C,
        stt: Box<dyn SttBackend>,
        wiring: IntakeWiring,
        config: IntakeConfig,
        audio: &AudioConfig,
    ) -> Self {
        let segmenter = SpeechSegmenter::new(config.segmenter.clone(), audio.frame_size, audio.sample_rate);
        Self {
            source,
            classifier,
            segmenter,
            stt,
            wiring,
            config,
        }
    }

    pub fn segmenter(&self) -> &SpeechSegmenter {
        &self.segmenter
    }

    /// Run one iteration, sleeping where the loop would idle.
    pub fn tick(&mut self) -> IntakeTick {
        if self.wiring.arbiter.is_paused() {
            self.source.discard_pending();
            thread::sleep(Duration::from_millis(self.config.paused_poll_ms));
            return IntakeTick::Paused;
        }
        if self.wiring.speaking.is_speaking() {
            self.source.discard_pending();
            thread::sleep(Duration::from_millis(self.config.speaking_poll_ms));
            return IntakeTick::FeedbackPlaying;
        }

        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Audio read failed: {}", e);
                thread::sleep(Duration::from_millis(self.config.read_backoff_ms));
                return IntakeTick::ReadFailed;
            }
        };

        let is_speech = match self.classifier.is_speech(&frame) {
            Ok(speech) => speech,
            Err(e) => {
                warn!("Speech classification failed, treating frame as silence: {}", e);
                false
            }
        };

        match self.segmenter.push(&frame, is_speech) {
            None => IntakeTick::Listening,
            Some(SegmentEvent::Started) => IntakeTick::UtteranceStarted,
            Some(SegmentEvent::Discarded { .. }) => IntakeTick::UtteranceDiscarded,
            Some(SegmentEvent::Completed(utterance)) => {
                info!("📝 Transcribing {:.1}s of audio", utterance.duration().as_secs_f32());
                let text = match self.stt.transcribe(&utterance) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Transcription failed: {}", e);
                        return IntakeTick::TranscriptionFailed;
                    }
                };
                match accept_transcript(&text, self.config.min_command_chars) {
                    Some(command) => {
                        let command = command.with_speed(self.config.command_speed);
                        info!("📥 Command: {}", command.text);
                        let text = command.text.clone();
                        if self.wiring.commands.push(command) {
                            IntakeTick::CommandQueued(text)
                        } else {
                            warn!("Command queue closed; dropping command");
                            IntakeTick::CommandDropped(text)
                        }
                    }
                    None => {
                        info!("Ignoring short transcript: {:?}", text);
                        IntakeTick::TranscriptRejected(text)
                    }
                }
            }
        }
    }

    /// Tick until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            self.tick();
        }
    }
}

/// Handle to the intake thread started by [`spawn_intake`].
pub struct IntakeHandle {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl IntakeHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Clear the running flag and join the thread. The current frame read finishes first.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Intake thread panicked");
            }
            info!("🛑 Intake stopped");
        }
    }
}

impl Drop for IntakeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the intake loop on its own thread.
///
/// `build` runs on that thread and constructs the frame source and classifier,
/// which are usually not `Send` (CPAL stream, WebRTC detector). Its error is
/// returned here.
pub fn spawn_intake<S, C, F>(
    build: F,
    stt: Box<dyn SttBackend>,
    wiring: IntakeWiring,
    config: IntakeConfig,
    audio: AudioConfig,
) -> VoiceResult<IntakeHandle>
where
    S: FrameSource,
    C: SpeechClassifier,
    F: FnOnce() -> VoiceResult<(S, C)> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<()>>();
    let thread_running = Arc::clone(&running);

    let handle = thread::Builder::new().name("intake".to_string()).spawn(move || {
        let (source, classifier) = match build() {
            Ok(parts) => {
                let _ = ready_tx.send(Ok(()));
                parts
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        info!("🔄 Intake thread started");
        let mut intake = IntakeLoop::new(source, classifier, stt, wiring, config, &audio);
        intake.run(&thread_running);
    })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(IntakeHandle {
            running,
            thread: Some(handle),
        }),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(VoiceError::AudioStream("intake thread exited during startup".to_string()))
        }
    }
}
