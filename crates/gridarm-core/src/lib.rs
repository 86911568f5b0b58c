//! # gridarm-core
//!
//! Configuration and task orchestration for the grid arm.
//!
//! ```text
//!  CommandQueue ──► ControlLoop ──► SnapshotSource ──► DecisionMaker
//!                      │  ▲                               │
//!          pause/resume│  └──── DecisionResponse ◄────────┘
//!                      ▼
//!               IntakeArbiter        GridActionMapper ──► MotionCoordinator
//! ```

pub mod config;
pub mod context;
pub mod control;
pub mod decision;
pub mod error;
pub mod snapshot;

pub use config::{
    decision_api_key_from_env, env_source, ArmConfig, ControlConfig, DecisionConfig, MotionConfig, SnapshotConfig,
};
pub use context::{InteractionContext, Turn, REDACTED_OBSERVATION};
pub use control::{ControlLoop, ControlSettings, TaskOutcome, TaskReport};
pub use decision::{parse_decision, Action, DecisionMaker, DecisionResponse, OpenRouterDecisionMaker, SYSTEM_PROMPT};
pub use error::{CoreError, CoreResult};
pub use snapshot::{FileSnapshotSource, Snapshot, SnapshotSource};
