//! Non-reentrancy guard for periodic jobs.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lets at most one run of a job be in flight. A tick that finds the job
/// running is skipped, never queued.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    running: AtomicBool,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard. `None` means another run holds it.
    pub fn try_begin(&self) -> Option<InFlightPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit {
                running: &self.running,
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop, including when the run errors or panics.
#[derive(Debug)]
pub struct InFlightPermit<'a> {
    running: &'a AtomicBool,
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
