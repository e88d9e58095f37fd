//! Cancellation utilities
//!
//! Provides a first-class cancellation handle for long-running calls. The
//! host (a closed popup, a navigated tab) cancels the handle; the poll loop
//! observes it at attempt boundaries and stops scheduling further requests.
//! An in-flight HTTP request may still complete, but its result is discarded.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Request cancellation. The observing call stops as soon as it reaches
    /// its next attempt boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Create a standalone cancel handle that can be shared across tasks.
pub fn new_cancel_handle() -> CancelHandle {
    CancelHandle::new(Arc::new(AtomicBool::new(false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_shared_across_clones() {
        let handle = new_cancel_handle();
        let observer = handle.clone();
        assert!(!observer.is_cancelled());
        handle.cancel();
        assert!(observer.is_cancelled());
    }
}
