//! Environment abstraction for deterministic testing.
//!
//! Decouples the synchronization state machines from the wall clock. The
//! connection, poller and dispatcher logic never read time themselves: the
//! driver asks the [`Environment`] for `now()` and passes it in. Production uses
//! the tokio clock, tests use a paused or virtual clock.

use std::{future::Future, ops::Sub, time::Duration};

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `tokio::time::Instant`, simulations may use
    /// any monotonic virtual instant.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not by the state machines).
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
