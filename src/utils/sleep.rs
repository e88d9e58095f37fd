//! Injectable sleep seam.
//!
//! The poll loop's per-attempt delay goes through this trait so tests can
//! drive 60 attempts without wall-clock waits.

use std::time::Duration;

use async_trait::async_trait;

/// Cooperative delay provider.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Default sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
