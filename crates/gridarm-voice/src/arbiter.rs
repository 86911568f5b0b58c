//! Pause gate between voice intake and task execution.
//!
//! A single lock-guarded flag: the control loop writes it around each task,
//! the intake loop polls it before every frame. No queued intent; the last
//! writer wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Shared pause flag. Clones refer to the same flag.
#[derive(Debug, Clone, Default)]
pub struct IntakeArbiter {
    paused: Arc<Mutex<bool>>,
}

impl IntakeArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        // A bool cannot be left half-written; recover from poisoning.
        self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pause(&self) {
        *self.flag() = true;
        info!("Command intake paused");
    }

    pub fn resume(&self) {
        *self.flag() = false;
        info!("Command intake resumed");
    }

    /// Flip the flag and return the new state.
    pub fn toggle_pause(&self) -> bool {
        let mut paused = self.flag();
        *paused = !*paused;
        info!("Command intake {}", if *paused { "paused" } else { "resumed" });
        *paused
    }

    pub fn is_paused(&self) -> bool {
        *self.flag()
    }
}
