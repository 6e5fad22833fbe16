//! Shared pause coordination between the monitor and the redemption sweeper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative pause flag handed to the trade monitor and the redemption
/// sweeper at construction.
///
/// This is not a lock: an event handler already past its precondition check
/// when the flag is set will still complete. The sweeper mitigates the race
/// by pausing before it enumerates the ledger.
#[derive(Clone, Default)]
pub struct CopyGate {
    paused: Arc<AtomicBool>,
}

impl CopyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Pause until the returned guard is dropped.
    ///
    /// The guard resumes in `Drop`, so copying can never stay paused past the
    /// scope that engaged it, however that scope exits.
    pub fn pause_guard(&self) -> PauseGuard {
        self.pause();
        PauseGuard { gate: self.clone() }
    }
}

/// RAII guard that clears the pause flag when dropped.
pub struct PauseGuard {
    gate: CopyGate,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.gate.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_resume() {
        let gate = CopyGate::new();
        assert!(!gate.is_paused());

        gate.pause();
        assert!(gate.is_paused());

        gate.resume();
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_guard_resumes_on_drop() {
        let gate = CopyGate::new();
        {
            let _guard = gate.pause_guard();
            assert!(gate.is_paused());
        }
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_guard_resumes_on_panic() {
        let gate = CopyGate::new();
        let cloned = gate.clone();

        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.pause_guard();
            panic!("sweep blew up");
        });

        assert!(result.is_err());
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_clones_share_state() {
        let gate = CopyGate::new();
        let other = gate.clone();
        gate.pause();
        assert!(other.is_paused());
    }
}
