//! Arm configuration: defaults, then an optional TOML file, then `GRIDARM__*` environment.
//!
//! Precedence: env `GRIDARM_CONFIG` path > `config/gridarm.toml` > defaults; environment
//! variables such as `GRIDARM__MOTION__STEP_INTERVAL_MS=5` override both. API keys are
//! read from the environment only ([`decision_api_key_from_env`]).

use crate::error::{CoreError, CoreResult};
use gridarm_motion::{Pose, SdkConfig};
use gridarm_voice::{AudioConfig, IntakeConfig, SpeechConfig, VadConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "config/gridarm.toml";

fn default_step_interval_ms() -> u64 {
    10
}

fn default_settle_ms() -> u64 {
    500
}

fn default_post_feedback_pause_ms() -> u64 {
    1500
}

fn default_home() -> Pose {
    Pose::HOME
}

fn default_park() -> Pose {
    Pose::PARK
}

/// Motion timing and the two named poses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Pause after every single-pulse write
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,
    /// Pause after each executed action
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause after spoken feedback finished, before the next step
    #[serde(default = "default_post_feedback_pause_ms")]
    pub post_feedback_pause_ms: u64,
    #[serde(default = "default_home")]
    pub home: Pose,
    #[serde(default = "default_park")]
    pub park: Pose,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step_interval_ms: default_step_interval_ms(),
            settle_ms: default_settle_ms(),
            post_feedback_pause_ms: default_post_feedback_pause_ms(),
            home: default_home(),
            park: default_park(),
        }
    }
}

impl MotionConfig {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn post_feedback_pause(&self) -> Duration {
        Duration::from_millis(self.post_feedback_pause_ms)
    }
}

fn default_max_steps() -> usize {
    10
}

fn default_command_poll_ms() -> u64 {
    1000
}

fn default_feedback_speed() -> f32 {
    1.1
}

/// Task loop limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Decision steps per command
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// How long one command-queue poll blocks
    #[serde(default = "default_command_poll_ms")]
    pub command_poll_ms: u64,
    /// Playback speed for spoken feedback
    #[serde(default = "default_feedback_speed")]
    pub feedback_speed: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            command_poll_ms: default_command_poll_ms(),
            feedback_speed: default_feedback_speed(),
        }
    }
}

fn default_decision_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_decision_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.5
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Vision-language model used as the decision-maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_decision_url")]
    pub api_url: String,
    #[serde(default = "default_decision_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            api_url: default_decision_url(),
            model: default_decision_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_image_path() -> PathBuf {
    PathBuf::from("data/camera/latest.png")
}

/// Where the camera process drops its latest frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            image_path: default_image_path(),
        }
    }
}

/// Complete configuration for the arm daemon.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArmConfig {
    #[serde(default)]
    pub hardware: SdkConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl ArmConfig {
    /// Load from `GRIDARM_CONFIG` (or `config/gridarm.toml` if present) and the environment.
    pub fn load() -> CoreResult<Self> {
        let path = std::env::var("GRIDARM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let path = path.exists().then_some(path);
        Self::load_with(path.as_deref(), env_source())
    }

    /// Load from an explicit file (if any) and environment source.
    pub fn load_with(path: Option<&Path>, env: config::Environment) -> CoreResult<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => {
                info!("📄 Loading configuration from {}", path.display());
                builder.add_source(config::File::from(path))
            }
            None => builder,
        };
        let loaded: ArmConfig = builder.add_source(env).build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject combinations the hardware or detector can't work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.audio.sample_rate != self.vad.sample_rate {
            return Err(CoreError::Configuration(format!(
                "Audio sample rate ({}) must match VAD sample rate ({})",
                self.audio.sample_rate, self.vad.sample_rate
            )));
        }
        if self.audio.frame_size == 0 {
            return Err(CoreError::Configuration("audio.frame_size must be positive".to_string()));
        }
        if self.control.max_steps == 0 {
            return Err(CoreError::Configuration("control.max_steps must be positive".to_string()));
        }
        if self.hardware.joint_count == 0 {
            return Err(CoreError::Configuration("hardware.joint_count must be positive".to_string()));
        }
        Ok(())
    }
}

/// `GRIDARM__SECTION__KEY` environment overrides.
pub fn env_source() -> config::Environment {
    config::Environment::with_prefix("GRIDARM").separator("__").try_parsing(true)
}

/// Decision-maker API key: `GRIDARM_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`.
pub fn decision_api_key_from_env() -> Option<String> {
    ["GRIDARM_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
