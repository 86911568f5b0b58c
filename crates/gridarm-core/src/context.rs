//! Conversation state for one task.
//!
//! Every step adds an observation (camera frame, plus the instruction on the
//! first step) and the decision-maker's reply. Before a new observation is
//! added, all earlier observations are replaced by a text placeholder so only
//! the latest image is ever sent.

use crate::snapshot::Snapshot;

/// Text that stands in for an observation once a newer one exists.
pub const REDACTED_OBSERVATION: &str = "[IMAGE]";

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    /// User turn with the current frame.
    Observation {
        instruction: Option<String>,
        snapshot: Snapshot,
    },
    /// User turn whose frame was superseded.
    Redacted,
    /// Raw decision-maker reply.
    Reply(String),
}

impl Turn {
    pub fn role(&self) -> &'static str {
        match self {
            Turn::Observation { .. } | Turn::Redacted => "user",
            Turn::Reply(_) => "assistant",
        }
    }
}

/// Turns accumulated while one command is being carried out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionContext {
    turns: Vec<Turn>,
}

impl InteractionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redact earlier observations, then append this one.
    pub fn push_observation(&mut self, instruction: Option<&str>, snapshot: Snapshot) {
        for turn in &mut self.turns {
            if matches!(turn, Turn::Observation { .. }) {
                *turn = Turn::Redacted;
            }
        }
        self.turns.push(Turn::Observation {
            instruction: instruction.map(str::to_string),
            snapshot,
        });
    }

    pub fn push_reply(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Reply(text.into()));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
