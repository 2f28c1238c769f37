//! Fallback poller.
//!
//! Periodic full-state refresh while the push channel is not connected. The
//! poller owns no timer: the session feeds it connection state changes and
//! ticks, and it answers whether a refresh is due.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

/// Interval between refreshes while polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Poll schedule for one match.
#[derive(Debug, Clone)]
pub struct Poller<I = Instant>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    interval: Duration,
    /// When the current interval started. `None` while stopped.
    since: Option<I>,
}

impl<I> Poller<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a stopped poller.
    pub fn new(interval: Duration) -> Self {
        Self { interval, since: None }
    }

    /// Whether polling is active.
    pub fn is_active(&self) -> bool {
        self.since.is_some()
    }

    /// Start polling. The first refresh is due one interval from `now`.
    /// Starting an active poller keeps its schedule.
    pub fn start(&mut self, now: I) {
        if self.since.is_none() {
            tracing::debug!(interval = ?self.interval, "fallback polling started");
            self.since = Some(now);
        }
    }

    /// Stop polling. Idempotent.
    pub fn stop(&mut self) {
        if self.since.take().is_some() {
            tracing::debug!("fallback polling stopped");
        }
    }

    /// Returns true once per elapsed interval while active.
    pub fn tick(&mut self, now: I) -> bool {
        let Some(since) = self.since else {
            return false;
        };
        if now - since < self.interval {
            return false;
        }
        self.since = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_interval() {
        let base = Instant::now();
        let mut poller: Poller = Poller::new(DEFAULT_POLL_INTERVAL);
        poller.start(base);

        assert!(!poller.tick(base + Duration::from_secs(2)));
        assert!(poller.tick(base + Duration::from_secs(3)));
        assert!(!poller.tick(base + Duration::from_secs(4)));
        assert!(poller.tick(base + Duration::from_secs(6)));
    }

    #[test]
    fn stopped_poller_never_fires() {
        let base = Instant::now();
        let mut poller: Poller = Poller::new(DEFAULT_POLL_INTERVAL);
        poller.start(base);
        poller.stop();

        assert!(!poller.is_active());
        assert!(!poller.tick(base + Duration::from_secs(30)));
    }

    #[test]
    fn restart_keeps_schedule() {
        let base = Instant::now();
        let mut poller: Poller = Poller::new(DEFAULT_POLL_INTERVAL);
        poller.start(base);
        poller.start(base + Duration::from_secs(2));

        assert!(poller.tick(base + Duration::from_secs(3)));
    }
}
