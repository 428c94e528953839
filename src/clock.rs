//! Time source and sleep abstraction
//!
//! Cooldowns and retry backoff go through a trait so the pool and the
//! fetcher are testable without real timing.

use std::time::{Duration, Instant};

use async_trait::async_trait;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Tokio-backed wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ManualClock;
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_secs(5)).await;

        assert_eq!(clock.now() - before, Duration::from_secs(5));
        assert_eq!(clock.slept(), vec![Duration::from_secs(5)]);
    }
}
