//! Speech classification using WebRTC VAD
//!
//! WebRTC VAD only accepts 10/20/30ms windows, while the intake loop works on
//! larger frames. A frame is split into 30ms windows and counts as speech when
//! the voiced windows add up to at least `min_speech_duration_ms`.

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

const WINDOW_MS: u32 = 30;

/// Binary speech/non-speech decision for one audio frame.
pub trait SpeechClassifier {
    fn is_speech(&mut self, frame: &[f32]) -> VoiceResult<bool>;
}

fn default_mode() -> u8 {
    2
}

fn default_quiet_threshold() -> f32 {
    0.01
}

fn default_min_speech_ms() -> u32 {
    60
}

/// Configuration for VAD detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    /// Sample rate (must be 8000, 16000, 32000, or 48000 Hz for WebRTC VAD)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Detection mode (0-3, where 3 is most aggressive)
    #[serde(default = "default_mode")]
    pub mode: u8,

    /// Frames whose peak amplitude stays below this are silence without running the detector
    #[serde(default = "default_quiet_threshold")]
    pub quiet_threshold: f32,

    /// Voiced audio needed inside one frame for it to count as speech
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_duration_ms: u32,
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            mode: default_mode(),
            quiet_threshold: default_quiet_threshold(),
            min_speech_duration_ms: default_min_speech_ms(),
        }
    }
}

fn vad_mode(mode: u8) -> VadMode {
    match mode {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        _ => VadMode::VeryAggressive,
    }
}

fn vad_sample_rate(rate: u32) -> VoiceResult<SampleRate> {
    match rate {
        8000 => Ok(SampleRate::Rate8kHz),
        16000 => Ok(SampleRate::Rate16kHz),
        32000 => Ok(SampleRate::Rate32kHz),
        48000 => Ok(SampleRate::Rate48kHz),
        _ => Err(VoiceError::Config(format!(
            "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
            rate
        ))),
    }
}

/// Voice Activity Detector using WebRTC VAD. Not `Send`; build it on the intake thread.
pub struct VadDetector {
    vad: Vad,
    config: VadConfig,
    window: usize,
    min_voiced_windows: usize,
}

impl VadDetector {
    /// Create a new VAD detector with the given configuration
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        info!(
            "🎙️ Initializing WebRTC VAD (sample_rate: {}Hz, mode: {})",
            config.sample_rate, config.mode
        );

        let sample_rate = vad_sample_rate(config.sample_rate)?;
        if config.mode > 3 {
            return Err(VoiceError::Config(format!("VAD mode must be 0-3, got {}", config.mode)));
        }

        // At 16kHz: 16000 samples/sec * 0.03 sec = 480 samples
        let window = (config.sample_rate * WINDOW_MS / 1000) as usize;
        let min_voiced_windows = config.min_speech_duration_ms.div_ceil(WINDOW_MS).max(1) as usize;

        let mut vad = Vad::new();
        vad.set_mode(vad_mode(config.mode));
        vad.set_sample_rate(sample_rate);

        info!("✅ VAD initialized (window: {} samples, {} voiced windows for speech)", window, min_voiced_windows);

        Ok(Self {
            vad,
            config,
            window,
            min_voiced_windows,
        })
    }

    /// Samples per detector window.
    pub fn window_size(&self) -> usize {
        self.window
    }

    fn window_is_voiced(&mut self, window: &[f32]) -> VoiceResult<bool> {
        let pcm: Vec<i16> = window
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        self.vad
            .is_voice_segment(&pcm)
            .map_err(|e| VoiceError::VadProcessing(format!("VAD processing failed: {:?}", e)))
    }
}

/// Peak absolute amplitude of a frame.
pub fn peak_amplitude(frame: &[f32]) -> f32 {
    frame.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

impl SpeechClassifier for VadDetector {
    fn is_speech(&mut self, frame: &[f32]) -> VoiceResult<bool> {
        if peak_amplitude(frame) < self.config.quiet_threshold {
            return Ok(false);
        }
        let mut voiced = 0;
        for window in frame.chunks_exact(self.window) {
            if self.window_is_voiced(window)? {
                voiced += 1;
            }
        }
        let speech = voiced >= self.min_voiced_windows;
        debug!(voiced, speech, "VAD frame");
        Ok(speech)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vad_initialization() {
        let detector = VadDetector::new(VadConfig::default()).unwrap();
        assert_eq!(detector.window_size(), 480); // 30ms at 16kHz
        assert_eq!(detector.min_voiced_windows, 2);
    }

    #[test]
    fn test_invalid_sample_rate() {
        let config = VadConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(VadDetector::new(config).is_err());
    }

    #[test]
    fn test_invalid_mode() {
        let config = VadConfig {
            mode: 4,
            ..Default::default()
        };
        assert!(VadDetector::new(config).is_err());
    }

    #[test]
    fn test_silence_detection() {
        let mut detector = VadDetector::new(VadConfig::default()).unwrap();
        let silence = vec![0.0f32; 2048];
        assert!(!detector.is_speech(&silence).unwrap());
    }

    #[test]
    fn test_quiet_frame_skips_detector() {
        let mut detector = VadDetector::new(VadConfig::default()).unwrap();
        let hum: Vec<f32> = (0..2048).map(|i| 0.005 * (i as f32 * 0.3).sin()).collect();
        assert!(!detector.is_speech(&hum).unwrap());
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(peak_amplitude(&[0.1, -0.4, 0.2]), 0.4);
        assert_eq!(peak_amplitude(&[]), 0.0);
    }
}
