//! # Grid Arm Voice - Command Intake and Spoken Feedback
//!
//! Turns a continuous microphone stream into discrete spoken commands and plays
//! spoken feedback without the arm ever listening to itself.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Intake thread                             │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌───────────┐   │
//! │  │  Audio In  │→ │ WebRTC VAD │→ │ Segmenter  │→ │    STT    │   │
//! │  │   (cpal)   │  │ classifier │  │ (silence)  │  │ (reqwest) │   │
//! │  └────────────┘  └────────────┘  └────────────┘  └───────────┘   │
//! │        ↑ paused?          ↑ speaking?                  ↓         │
//! └────────┼──────────────────┼────────────────────────────┼─────────┘
//!   ┌──────┴───────┐  ┌───────┴────────┐         ┌─────────┴────────┐
//!   │IntakeArbiter │  │ FeedbackQueue  │         │  CommandQueue    │
//!   │ (pause flag) │  │ (rodio worker) │         │ (to control loop)│
//!   └──────────────┘  └────────────────┘         └──────────────────┘
//! ```

pub mod arbiter;
pub mod audio;
pub mod error;
pub mod feedback;
pub mod intake;
pub mod queue;
pub mod segmenter;
pub mod stt;
pub mod vad;

pub use arbiter::IntakeArbiter;
pub use audio::{AudioConfig, FrameSource, MicrophoneSource};
pub use error::{VoiceError, VoiceResult};
pub use feedback::{
    create_best_tts, FeedbackPlayback, FeedbackQueue, OpenAiTts, PlaceholderTts, Player, RodioPlayer,
    SpeakingSignal, TtsBackend,
};
pub use intake::{spawn_intake, IntakeConfig, IntakeHandle, IntakeLoop, IntakeTick, IntakeWiring};
pub use queue::{command_queue, Command, CommandPoll, CommandReceiver, CommandSender, DEFAULT_COMMAND_SPEED};
pub use segmenter::{SegmentEvent, SegmenterConfig, SegmenterState, SpeechSegmenter, Utterance};
pub use stt::{accept_transcript, create_best_stt, OpenAiStt, PlaceholderStt, SpeechConfig, SttBackend};
pub use vad::{SpeechClassifier, VadConfig, VadDetector};
