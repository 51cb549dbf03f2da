//! Cooperative cancellation shared between the worker pool, the storage
//! gateway's retry loops, and the orchestrator's run poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheap clonable cancellation flag. Checked before retries and before new
/// batch dispatch; in-flight work is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_propagates_to_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
