//! Time source abstraction.
//!
//! The rate limiter reads time through [`Clock`] so window expiry can be
//! tested deterministically with a hand-driven clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Trait for providing the current time.
///
/// # Example
///
/// ```
/// use shellwise::clock::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// assert!(clock.now().as_secs() > 0);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the time elapsed since the Unix epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock time source used in production.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}
