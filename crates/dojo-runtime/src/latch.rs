//! One-shot "stopping requested" flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set once, by whoever stops the containers first.
///
/// Both the run task (after the foreground command exits) and the signal
/// handler try to stop the containers. [`StopLatch::claim`] lets exactly one
/// of them proceed, and the watchdog polls [`StopLatch::is_set`] to know when
/// to give up.
#[derive(Debug, Default)]
pub struct StopLatch {
    stopping: AtomicBool,
}

impl StopLatch {
    /// Creates an unset latch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stopping: AtomicBool::new(false),
        }
    }

    /// Sets the latch. Returns `true` only for the caller that set it.
    pub fn claim(&self) -> bool {
        self.stopping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether stopping has been requested.
    pub fn is_set(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}
