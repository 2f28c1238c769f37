//! Production environment backed by the tokio clock.

use std::{future::Future, time::Duration};

use truco_core::env::Environment;

/// Tokio time source.
///
/// Uses `tokio::time` rather than `std::time` so a paused test runtime drives
/// the same timers production does.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_paused_clock() {
        let env = SystemEnv;
        let start = env.now();
        env.sleep(Duration::from_secs(3)).await;
        assert!(env.now() - start >= Duration::from_secs(3));
    }
}
