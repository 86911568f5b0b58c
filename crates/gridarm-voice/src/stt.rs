//! **Speech-to-Text (STT)**: turn a completed [`Utterance`] into a [`Command`].
//!
//! Implement `SttBackend` for any transcription service. `OpenAiStt` talks to an
//! OpenAI-compatible `/audio/transcriptions` endpoint; `PlaceholderStt` returns
//! fixed text for tests and dry runs.

use crate::error::{VoiceError, VoiceResult};
use crate::queue::Command;
use crate::segmenter::Utterance;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Backend for converting an utterance to text.
pub trait SttBackend: Send + Sync {
    /// Transcribe one utterance. Return an empty string if nothing was recognized.
    fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String>;
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

/// Endpoints and models for transcription and spoken feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// OpenAI-compatible base URL without trailing slash.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    /// ISO-639-1 language hint for transcription (e.g. "ru"); `None` lets the service detect it.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            stt_model: default_stt_model(),
            language: None,
            tts_model: default_tts_model(),
            voice: default_voice(),
        }
    }
}

/// API key for the speech services: `GRIDARM_API_KEY`, then `OPENAI_API_KEY`.
pub fn speech_api_key_from_env() -> Option<String> {
    ["GRIDARM_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Keep a transcript as a command if, trimmed, it is longer than `min_chars` characters.
pub fn accept_transcript(text: &str, min_chars: usize) -> Option<Command> {
    let text = text.trim();
    if text.chars().count() > min_chars {
        Some(Command::new(text))
    } else {
        None
    }
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for API upload.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32; // 16-bit = 2 bytes per sample
    let mut buf = Vec::with_capacity(44 + data_len as usize);
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // subchunk1 size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// Placeholder STT: returns a fixed string.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of an empty transcript.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, _utterance: &Utterance) -> VoiceResult<String> {
        Ok(self.response.clone().unwrap_or_default())
    }
}

/// OpenAI-compatible transcription API (OpenAI Whisper, OpenRouter, local servers).
#[derive(Debug, Clone)]
pub struct OpenAiStt {
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
    client: reqwest::blocking::Client,
}

impl OpenAiStt {
    pub fn new(config: &SpeechConfig, api_key: impl Into<String>) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.stt_model.clone(),
            language: config.language.clone().filter(|l| !l.trim().is_empty()),
            client,
        })
    }
}

impl SttBackend for OpenAiStt {
    fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String> {
        if utterance.samples.is_empty() {
            return Ok(String::new());
        }
        let wav = pcm_f32_to_wav(&utterance.samples, utterance.sample_rate);
        let url = format!("{}/audio/transcriptions", self.base_url);
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(ref language) = self.language {
            form = form.text("language", language.clone());
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string())
    }
}

/// `OpenAiStt` when an API key is available, otherwise a silent `PlaceholderStt`.
pub fn create_best_stt(config: &SpeechConfig) -> Box<dyn SttBackend> {
    if let Some(key) = speech_api_key_from_env() {
        match OpenAiStt::new(config, key) {
            Ok(stt) => return Box::new(stt),
            Err(e) => warn!("STT client unavailable: {}", e),
        }
    }
    warn!("No speech API key; transcription disabled (placeholder STT)");
    Box::new(PlaceholderStt::new())
}
