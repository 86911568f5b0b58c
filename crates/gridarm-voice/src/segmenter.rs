//! Utterance segmentation: Idle → Recording → (silence timeout) → Idle.
//!
//! One frame in, at most one event out. A speech frame while idle opens an
//! utterance; every frame while recording is buffered; a run of more than
//! `silence_limit_frames` consecutive non-speech frames closes it. Closed
//! utterances shorter than `min_utterance_frames` worth of samples are dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

fn default_silence_limit_frames() -> u32 {
    16
}

fn default_min_utterance_frames() -> usize {
    3
}

/// Configuration for utterance segmentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Consecutive non-speech frames tolerated inside an utterance (default 16, ~2s at 2048 samples/16kHz)
    #[serde(default = "default_silence_limit_frames")]
    pub silence_limit_frames: u32,

    /// Minimum utterance length in frames of `frame_size` samples (default 3)
    #[serde(default = "default_min_utterance_frames")]
    pub min_utterance_frames: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_limit_frames: default_silence_limit_frames(),
            min_utterance_frames: default_min_utterance_frames(),
        }
    }
}

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Recording,
}

/// A completed segment of audio bounded by speech onset and a silence timeout.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Mono f32 samples from the first speech frame to the last received frame.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Frames buffered, speech and trailing silence included.
    pub frames: usize,
    /// Frames the classifier marked as speech.
    pub speech_frames: usize,
    /// When the first speech frame arrived.
    pub started_at: DateTime<Utc>,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate.max(1)))
    }

    pub fn contains_speech(&self) -> bool {
        self.speech_frames > 0
    }
}

/// What a single frame did to the segmenter.
#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// Speech onset; an utterance is now in progress.
    Started,
    /// Silence timeout on a long-enough utterance.
    Completed(Utterance),
    /// Silence timeout on an utterance below the minimum length.
    Discarded { samples: usize },
}

/// Silence-timeout state machine over fixed-size frames.
#[derive(Debug)]
pub struct SpeechSegmenter {
    config: SegmenterConfig,
    frame_size: usize,
    sample_rate: u32,
    state: SegmenterState,
    buffer: Vec<f32>,
    frames: usize,
    speech_frames: usize,
    silence_frames: u32,
    started_at: Option<DateTime<Utc>>,
}

impl SpeechSegmenter {
    /// `frame_size` is the nominal frame length used for the minimum-length check.
    pub fn new(config: SegmenterConfig, frame_size: usize, sample_rate: u32) -> Self {
        Self {
            config,
            frame_size,
            sample_rate,
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            frames: 0,
            speech_frames: 0,
            silence_frames: 0,
            started_at: None,
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Samples buffered for the utterance in progress.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one classified frame.
    pub fn push(&mut self, frame: &[f32], is_speech: bool) -> Option<SegmentEvent> {
        match self.state {
            SegmenterState::Idle => {
                if !is_speech {
                    return None;
                }
                info!("🎤 Speech detected, started recording");
                self.state = SegmenterState::Recording;
                self.buffer.clear();
                self.buffer.extend_from_slice(frame);
                self.frames = 1;
                self.speech_frames = 1;
                self.silence_frames = 0;
                self.started_at = Some(Utc::now());
                Some(SegmentEvent::Started)
            }
            SegmenterState::Recording => {
                self.buffer.extend_from_slice(frame);
                self.frames += 1;
                if is_speech {
                    self.speech_frames += 1;
                    self.silence_frames = 0;
                    return None;
                }
                self.silence_frames += 1;
                if self.silence_frames > self.config.silence_limit_frames {
                    Some(self.finish())
                } else {
                    None
                }
            }
        }
    }

    fn finish(&mut self) -> SegmentEvent {
        let samples = std::mem::take(&mut self.buffer);
        let frames = self.frames;
        let speech_frames = self.speech_frames;
        let started_at = self.started_at.take().unwrap_or_else(Utc::now);
        self.state = SegmenterState::Idle;
        self.frames = 0;
        self.speech_frames = 0;
        self.silence_frames = 0;

        let min_samples = self.config.min_utterance_frames * self.frame_size;
        if samples.len() < min_samples {
            debug!("⏭️ Utterance too short ({} samples), discarding", samples.len());
            return SegmentEvent::Discarded { samples: samples.len() };
        }
        info!("🎯 Utterance complete: {} frames, {} samples", frames, samples.len());
        SegmentEvent::Completed(Utterance {
            samples,
            sample_rate: self.sample_rate,
            frames,
            speech_frames,
            started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 2048;

    fn segmenter() -> SpeechSegmenter {
        SpeechSegmenter::new(SegmenterConfig::default(), FRAME, 16000)
    }

    fn frame(value: f32) -> Vec<f32> {
        vec![value; FRAME]
    }

    #[test]
    fn silence_only_never_records() {
        let mut seg = segmenter();
        for _ in 0..100 {
            assert!(seg.push(&frame(0.0), false).is_none());
        }
        assert_eq!(seg.state(), SegmenterState::Idle);
        assert_eq!(seg.buffered_samples(), 0);
    }

    #[test]
    fn speech_then_timeout_yields_one_utterance() {
        let mut seg = segmenter();
        assert!(matches!(seg.push(&frame(0.5), true), Some(SegmentEvent::Started)));
        assert!(seg.push(&frame(0.5), true).is_none());

        // 16 silent frames are tolerated, the 17th closes the utterance
        for _ in 0..16 {
            assert!(seg.push(&frame(0.0), false).is_none());
        }
        assert_eq!(seg.state(), SegmenterState::Recording);
        let event = seg.push(&frame(0.0), false);
        let utterance = match event {
            Some(SegmentEvent::Completed(u)) => u,
            other => panic!("expected a completed utterance, got {:?}", other),
        };
        assert_eq!(utterance.frames, 19);
        assert_eq!(utterance.speech_frames, 2);
        assert_eq!(utterance.samples.len(), 19 * FRAME);
        assert_eq!(utterance.samples[0], 0.5);
        assert!(utterance.contains_speech());
        assert_eq!(seg.state(), SegmenterState::Idle);

        for _ in 0..40 {
            assert!(seg.push(&frame(0.0), false).is_none());
        }
    }

    #[test]
    fn speech_resets_silence_counter() {
        let mut seg = segmenter();
        seg.push(&frame(0.5), true);
        for _ in 0..10 {
            seg.push(&frame(0.0), false);
        }
        seg.push(&frame(0.5), true);
        for _ in 0..16 {
            assert!(seg.push(&frame(0.0), false).is_none());
        }
        assert!(matches!(seg.push(&frame(0.0), false), Some(SegmentEvent::Completed(_))));
    }

    #[test]
    fn short_utterance_is_discarded() {
        // Small frames make the minimum length bite before the timeout does.
        let config = SegmenterConfig {
            silence_limit_frames: 1,
            min_utterance_frames: 3,
        };
        let mut seg = SpeechSegmenter::new(config, FRAME, 16000);
        seg.push(&[0.5; 100], true);
        seg.push(&[0.0; 100], false);
        match seg.push(&[0.0; 100], false) {
            Some(SegmentEvent::Discarded { samples }) => assert_eq!(samples, 300),
            other => panic!("expected discard, got {:?}", other),
        }
        assert_eq!(seg.state(), SegmenterState::Idle);
    }

    #[test]
    fn utterance_duration_follows_sample_count() {
        let u = Utterance {
            samples: vec![0.0; 32000],
            sample_rate: 16000,
            frames: 0,
            speech_frames: 0,
            started_at: Utc::now(),
        };
        assert_eq!(u.duration(), Duration::from_secs(2));
        assert!(!u.contains_speech());
    }
}
