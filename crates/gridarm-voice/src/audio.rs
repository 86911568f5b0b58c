//! Audio capture using CPAL
//!
//! The intake loop pulls fixed-size frames through [`FrameSource`]. The CPAL
//! callback pushes raw sample blocks into a channel and `read_frame` regroups
//! them into frames of exactly `frame_size` samples.

use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_frame_size() -> usize {
    2048
}

fn default_read_timeout_ms() -> u64 {
    1000
}

/// Audio configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Samples per frame handed to the segmenter (default: 2048, 128ms at 16kHz)
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    /// How long `read_frame` waits for the device before failing (default: 1000ms)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            frame_size: default_frame_size(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl AudioConfig {
    /// Duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / f64::from(self.sample_rate.max(1)))
    }
}

/// A blocking source of fixed-size mono f32 frames.
pub trait FrameSource {
    /// Block until the next frame is available. Errors are retried by the caller.
    fn read_frame(&mut self) -> VoiceResult<Vec<f32>>;

    /// Drop audio captured but not yet read. Called while intake is paused so
    /// stale audio isn't transcribed after resume.
    fn discard_pending(&mut self) {}
}

/// Default input device via CPAL. Not `Send` (the CPAL stream isn't on every
/// platform), so build it on the thread that reads from it.
pub struct MicrophoneSource {
    config: AudioConfig,
    sample_rx: mpsc::Receiver<Vec<f32>>,
    pending: Vec<f32>,
    _stream: Stream,
}

impl MicrophoneSource {
    /// Open the default input device and start streaming.
    pub fn open(config: AudioConfig) -> VoiceResult<Self> {
        info!(
            "🎤 Initializing audio capture ({}Hz, {} channels, {} samples/frame)",
            config.sample_rate, config.channels, config.frame_size
        );

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;

        info!(
            "📱 Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let default_config = device.default_input_config()?;
        info!("🔧 Default config: {:?}", default_config);

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sample_tx, sample_rx) = mpsc::channel::<Vec<f32>>();
        let channels = usize::from(config.channels.max(1));

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Keep the first channel only.
                let mono: Vec<f32> = data.iter().step_by(channels).copied().collect();
                if sample_tx.send(mono).is_err() {
                    warn!("Audio reader dropped; discarding samples");
                }
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        info!("✅ Audio capture started");

        Ok(Self {
            pending: Vec::with_capacity(config.frame_size * 2),
            config,
            sample_rx,
            _stream: stream,
        })
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl FrameSource for MicrophoneSource {
    fn read_frame(&mut self) -> VoiceResult<Vec<f32>> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        while self.pending.len() < self.config.frame_size {
            match self.sample_rx.recv_timeout(timeout) {
                Ok(block) => self.pending.extend_from_slice(&block),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(VoiceError::AudioStream(format!(
                        "no audio from device within {:?}",
                        timeout
                    )))
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(VoiceError::AudioStream("capture stream closed".to_string()))
                }
            }
        }
        let rest = self.pending.split_off(self.config.frame_size);
        Ok(std::mem::replace(&mut self.pending, rest))
    }

    fn discard_pending(&mut self) {
        while self.sample_rx.try_recv().is_ok() {}
        self.pending.clear();
    }
}
