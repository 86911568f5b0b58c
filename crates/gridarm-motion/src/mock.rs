//! In-memory actuator for exercising motion logic without hardware.

use crate::error::{MotionError, MotionResult};
use crate::hardware::HardwareActuator;
use crate::joint::{JointId, Pulse};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct MockLog {
    initialized: bool,
    writes: Vec<(JointId, Pulse)>,
    fail_on_write: Option<usize>,
    fail_next: usize,
    fail_init: bool,
}

/// Records every write. Clones share the same log, so a test can keep one
/// clone while the coordinator owns another.
#[derive(Debug, Clone)]
pub struct MockActuator {
    joint_count: usize,
    log: Arc<Mutex<MockLog>>,
}

impl MockActuator {
    pub fn new(joint_count: usize) -> Self {
        Self {
            joint_count,
            log: Arc::new(Mutex::new(MockLog::default())),
        }
    }

    /// Fail the `n`-th recorded write (1-based, counted since the last [`Self::clear`]) and every write after it.
    pub fn fail_on_write(self, n: usize) -> Self {
        self.lock().fail_on_write = Some(n);
        self
    }

    /// Reject the next `count` write attempts, then accept writes again.
    pub fn fail_next_writes(self, count: usize) -> Self {
        self.lock().fail_next = count;
        self
    }

    /// Make `initialize` fail.
    pub fn fail_init(self) -> Self {
        self.lock().fail_init = true;
        self
    }

    /// All writes issued so far, in order.
    pub fn writes(&self) -> Vec<(JointId, Pulse)> {
        self.lock().writes.clone()
    }

    /// Writes issued to one joint, in order.
    pub fn writes_to(&self, joint: JointId) -> Vec<Pulse> {
        self.lock()
            .writes
            .iter()
            .filter(|(j, _)| *j == joint)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn clear(&self) {
        self.lock().writes.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HardwareActuator for MockActuator {
    fn initialize(&mut self) -> MotionResult<()> {
        let mut log = self.lock();
        if log.fail_init {
            return Err(MotionError::Configuration("mock controller unavailable".to_string()));
        }
        log.initialized = true;
        Ok(())
    }

    fn write(&mut self, joint: JointId, pulse: Pulse) -> MotionResult<()> {
        let mut log = self.lock();
        let attempt = log.writes.len() + 1;
        if log.fail_next > 0 {
            log.fail_next -= 1;
            return Err(MotionError::HardwareWrite {
                joint,
                message: format!("mock write {} rejected", attempt),
            });
        }
        if log.fail_on_write.is_some_and(|n| attempt >= n) {
            return Err(MotionError::HardwareWrite {
                joint,
                message: format!("mock write {} rejected", attempt),
            });
        }
        log.writes.push((joint, pulse));
        Ok(())
    }

    fn joint_count(&self) -> usize {
        self.joint_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failure_recovers() {
        let mut mock = MockActuator::new(7).fail_next_writes(2);
        assert!(mock.write(0, 1500).is_err());
        assert!(mock.write(0, 1500).is_err());
        mock.write(0, 1500).unwrap();
        assert_eq!(mock.writes(), vec![(0, 1500)]);
    }

    #[test]
    fn persistent_failure_sticks() {
        let mut mock = MockActuator::new(7).fail_on_write(2);
        mock.write(1, 1600).unwrap();
        assert!(mock.write(1, 1601).is_err());
        assert!(mock.write(1, 1602).is_err());
        assert_eq!(mock.write_count(), 1);
    }
}
