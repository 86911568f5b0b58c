//! Spoken feedback: a single worker thread that synthesizes queued text and
//! plays it back one request at a time.
//!
//! The worker publishes a lock-guarded "speaking" flag and a pending count.
//! The intake loop polls [`SpeakingSignal`] so the arm never transcribes its own
//! voice; the control loop uses [`FeedbackPlayback`] to queue feedback and wait
//! for it to finish.

use crate::error::{VoiceError, VoiceResult};
use crate::stt::{speech_api_key_from_env, SpeechConfig};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often `wait_until_done` re-checks the queue.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const REQUEST_POLL_INTERVAL: Duration = Duration::from_secs(1);
const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Read-only view of whether feedback audio is playing right now.
pub trait SpeakingSignal: Send + Sync {
    fn is_speaking(&self) -> bool;
}

/// Feedback capability consumed by the control loop.
pub trait FeedbackPlayback: SpeakingSignal {
    /// Queue `text` for playback at `speed`. Returns `false` if the worker is gone.
    fn speak(&self, text: &str, speed: f32) -> bool;

    /// Block until nothing is playing and nothing is queued.
    fn wait_until_done(&self);
}

impl<T: SpeakingSignal + ?Sized> SpeakingSignal for Arc<T> {
    fn is_speaking(&self) -> bool {
        (**self).is_speaking()
    }
}

impl<T: FeedbackPlayback + ?Sized> FeedbackPlayback for Arc<T> {
    fn speak(&self, text: &str, speed: f32) -> bool {
        (**self).speak(text, speed)
    }

    fn wait_until_done(&self) {
        (**self).wait_until_done()
    }
}

impl SpeakingSignal for AtomicBool {
    fn is_speaking(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Text-to-speech backend. Returns encoded audio (WAV/MP3); empty means "nothing to play".
pub trait TtsBackend: Send {
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// Placeholder TTS: returns empty audio. Use for tests or when no TTS service is configured.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// OpenAI-compatible `/audio/speech` backend.
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    client: reqwest::blocking::Client,
}

impl OpenAiTts {
    pub fn new(config: &SpeechConfig, api_key: impl Into<String>) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.tts_model.clone(),
            voice: config.voice.clone(),
            client,
        })
    }
}

impl TtsBackend for OpenAiTts {
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// `OpenAiTts` when an API key is available, otherwise `PlaceholderTts`.
pub fn create_best_tts(config: &SpeechConfig) -> Box<dyn TtsBackend> {
    if let Some(key) = speech_api_key_from_env() {
        match OpenAiTts::new(config, key) {
            Ok(tts) => return Box::new(tts),
            Err(e) => warn!("TTS client unavailable: {}", e),
        }
    }
    warn!("No speech API key; spoken feedback disabled (placeholder TTS)");
    Box::new(PlaceholderTts)
}

/// Audio output used by the feedback worker.
pub trait Player {
    /// Start playing encoded audio at `speed` (1.0 = normal). Returns once playback has started.
    fn start(&mut self, audio: &[u8], speed: f32) -> VoiceResult<()>;

    /// Whether queued audio is still playing.
    fn is_playing(&self) -> bool;

    /// Stop playback immediately.
    fn stop(&mut self);
}

/// Default output device via Rodio. Not `Send`; build it on the worker thread.
pub struct RodioPlayer {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
}

impl RodioPlayer {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!("🔊 Feedback output ready");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
        })
    }
}

impl Player for RodioPlayer {
    fn start(&mut self, audio: &[u8], speed: f32) -> VoiceResult<()> {
        if audio.is_empty() {
            return Ok(());
        }
        let source = rodio::Decoder::new(Cursor::new(audio.to_vec()))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        // Speed changes pitch along with tempo, like replaying at a scaled sample rate.
        let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        self.sink.append(source.speed(speed).convert_samples::<f32>());
        self.sink.play();
        Ok(())
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}

#[derive(Debug)]
struct Request {
    text: String,
    speed: f32,
    generation: u64,
}

#[derive(Debug, Default)]
struct PlaybackState {
    speaking: bool,
    pending: usize,
    /// Bumped by `clear`; requests from older generations are skipped.
    generation: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<PlaybackState>,
    running: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Queue of spoken feedback served by one worker thread.
pub struct FeedbackQueue {
    shared: Arc<Shared>,
    tx: Mutex<Option<mpsc::Sender<Request>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FeedbackQueue {
    /// Start the worker. `make_player` runs on the worker thread; its failure is returned here.
    pub fn spawn<P, F>(tts: Box<dyn TtsBackend>, make_player: F) -> VoiceResult<Self>
    where
        P: Player,
        F: FnOnce() -> VoiceResult<P> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<()>>();

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("feedback".to_string())
            .spawn(move || {
                let mut player = match make_player() {
                    Ok(p) => {
                        let _ = ready_tx.send(Ok(()));
                        p
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                info!("🔄 Feedback worker started");
                run_worker(&worker_shared, &rx, tts.as_ref(), &mut player);
                info!("🛑 Feedback worker ended");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(VoiceError::Playback("feedback worker exited during startup".to_string()));
            }
        }

        Ok(Self {
            shared,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Worker with Rodio output on the default device.
    pub fn with_rodio(tts: Box<dyn TtsBackend>) -> VoiceResult<Self> {
        Self::spawn(tts, RodioPlayer::new)
    }

    /// Requests queued but not yet started.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending
    }

    /// Speaking, or something still queued.
    pub fn is_busy(&self) -> bool {
        let state = self.shared.lock();
        state.speaking || state.pending > 0
    }

    /// Drop every queued request. The one currently playing is not interrupted.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.generation += 1;
        if state.pending > 0 {
            debug!(dropped = state.pending, "feedback queue cleared");
        }
        state.pending = 0;
    }

    /// Stop playback, drop the queue and join the worker. Idempotent.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.clear();
        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        drop(tx);
        let handle = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Feedback worker panicked");
            }
        }
        let mut state = self.shared.lock();
        state.speaking = false;
        state.pending = 0;
    }
}

impl SpeakingSignal for FeedbackQueue {
    fn is_speaking(&self) -> bool {
        self.shared.lock().speaking
    }
}

impl FeedbackPlayback for FeedbackQueue {
    fn speak(&self, text: &str, speed: f32) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            return false;
        }
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        let mut state = self.shared.lock();
        let request = Request {
            text: text.to_string(),
            speed,
            generation: state.generation,
        };
        if tx.send(request).is_err() {
            return false;
        }
        state.pending += 1;
        true
    }

    fn wait_until_done(&self) {
        while self.is_busy() && self.shared.running.load(Ordering::SeqCst) {
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

impl Drop for FeedbackQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<P: Player>(shared: &Shared, rx: &mpsc::Receiver<Request>, tts: &dyn TtsBackend, player: &mut P) {
    while shared.running.load(Ordering::SeqCst) {
        let request = match rx.recv_timeout(REQUEST_POLL_INTERVAL) {
            Ok(r) => r,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        {
            let mut state = shared.lock();
            if request.generation != state.generation {
                continue;
            }
            state.pending = state.pending.saturating_sub(1);
            state.speaking = true;
        }
        info!("🗣️ Speaking: {}", request.text);
        if let Err(e) = play_request(shared, tts, player, &request) {
            error!("Feedback playback failed: {}", e);
        }
        shared.lock().speaking = false;
        debug!("Finished speaking");
    }
    player.stop();
}

fn play_request<P: Player>(shared: &Shared, tts: &dyn TtsBackend, player: &mut P, request: &Request) -> VoiceResult<()> {
    let audio = tts.synthesize(&request.text)?;
    player.start(&audio, request.speed)?;
    while player.is_playing() {
        if !shared.running.load(Ordering::SeqCst) {
            player.stop();
            break;
        }
        thread::sleep(PLAYBACK_POLL_INTERVAL);
    }
    Ok(())
}
