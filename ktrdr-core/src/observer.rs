//! Run observer — the single capability through which a run reports
//! progress and learns about cancellation.
//!
//! The core calls into the observer; nothing calls back into the core.
//! The backtest loop checks `cancelled()` before each bar, the trainer at
//! each epoch boundary. Wall-clock budgets are the scheduler's business —
//! the core never consults the clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observer capability with a small fixed method set.
pub trait RunObserver: Send + Sync {
    /// A run phase is starting (`"train"`, `"backtest"`, ...).
    fn on_start(&self, _operation: &str, _total_steps: usize) {}

    /// Progress within the current phase.
    fn on_progress(&self, _step: usize, _total: usize) {}

    /// Cooperative cancellation check.
    fn cancelled(&self) -> bool {
        false
    }

    /// The run finished (successfully or not); `summary` is human-readable.
    fn on_finish(&self, _summary: &str) {}
}

/// Observer that ignores everything and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Cancellation flag usable both as an observer and as a remote handle.
///
/// Clone it, hand one copy to the run, keep the other to call `cancel()`.
#[derive(Debug, Default, Clone)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl RunObserver for CancelFlag {
    fn cancelled(&self) -> bool {
        self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_never_cancels() {
        assert!(!NoopObserver.cancelled());
    }

    #[test]
    fn cancel_flag_propagates_across_clones() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.cancelled());
        handle.cancel();
        assert!(flag.cancelled());
    }
}
