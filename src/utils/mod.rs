//! Utility modules: cancellation handles and the sleep seam used by the
//! poll loop.

pub mod cancel;
pub mod sleep;

pub use cancel::{CancelHandle, new_cancel_handle};
pub use sleep::{Sleeper, TokioSleeper};
