//! Local sliding-window rate limiting.
//!
//! Three windows (minute, hour, day) are tracked independently and a call is
//! admitted only when all of them have room. Timestamps are kept while the
//! limiter is switched off, so turning it back on resumes with accurate
//! accounting.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    pub fn duration(self) -> Duration {
        match self {
            Window::Minute => Duration::from_secs(60),
            Window::Hour => Duration::from_secs(60 * 60),
            Window::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Window::Minute => "minute",
            Window::Hour => "hour",
            Window::Day => "day",
        };
        f.pad(name)
    }
}

/// Ceilings for each window, read once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub rpm: usize,
    pub rph: usize,
    pub rpd: usize,
    pub enabled: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            rpm: 10,
            rph: 60,
            rpd: 100,
            enabled: true,
        }
    }
}

impl RateLimitSettings {
    pub fn limit(&self, window: Window) -> usize {
        match window {
            Window::Minute => self.rpm,
            Window::Hour => self.rph,
            Window::Day => self.rpd,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for window in Window::ALL {
            if self.limit(window) == 0 {
                return Err(Error::Config(format!(
                    "rate limit for the {} window must be at least 1",
                    window
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Allowed,
    Denied { window: Window, retry_after: Duration },
}

impl AdmitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmitDecision::Allowed)
    }
}

/// Requests counted in one window at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub window: Window,
    pub used: usize,
    pub limit: usize,
}

impl WindowUsage {
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }
}

struct WindowLog {
    window: Window,
    limit: usize,
    stamps: VecDeque<Duration>,
}

impl WindowLog {
    fn new(window: Window, limit: usize) -> Self {
        Self {
            window,
            limit,
            stamps: VecDeque::new(),
        }
    }

    fn is_live(&self, stamp: Duration, now: Duration) -> bool {
        now.saturating_sub(stamp) < self.window.duration()
    }

    fn prune(&mut self, now: Duration) {
        while let Some(&oldest) = self.stamps.front() {
            if self.is_live(oldest, now) {
                break;
            }
            self.stamps.pop_front();
        }
    }

    fn live_count(&self, now: Duration) -> usize {
        self.stamps.iter().filter(|&&s| self.is_live(s, now)).count()
    }

    /// Time until the oldest live entry leaves the window.
    fn retry_after(&self, now: Duration) -> Duration {
        match self.stamps.front() {
            Some(&oldest) => (oldest + self.window.duration()).saturating_sub(now),
            None => self.window.duration(),
        }
    }
}

/// Multi-window request limiter.
///
/// `admit` takes `&mut self`, so overlapping calls are ruled out by the
/// borrow checker; callers sharing a limiter wrap it in a `Mutex`.
pub struct RateLimiter {
    logs: [WindowLog; 3],
    enabled: bool,
    clock: Box<dyn Clock>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self::with_clock(settings, Box::new(SystemClock))
    }

    /// Creates a limiter driven by a custom clock (for testing).
    pub fn with_clock(settings: RateLimitSettings, clock: Box<dyn Clock>) -> Self {
        Self {
            logs: Window::ALL.map(|w| WindowLog::new(w, settings.limit(w))),
            enabled: settings.enabled,
            clock,
        }
    }

    /// Admits or rejects one call, recording it on success.
    ///
    /// Windows are checked minute, hour, day; the first one at its ceiling
    /// is reported. While disabled every call is admitted and nothing is
    /// recorded.
    pub fn admit(&mut self) -> AdmitDecision {
        if !self.enabled {
            return AdmitDecision::Allowed;
        }

        let now = self.clock.now();
        for log in self.logs.iter_mut() {
            log.prune(now);
        }

        for log in &self.logs {
            if log.stamps.len() >= log.limit {
                let retry_after = log.retry_after(now);
                debug!("{} window full ({}/{})", log.window, log.stamps.len(), log.limit);
                return AdmitDecision::Denied {
                    window: log.window,
                    retry_after,
                };
            }
        }

        for log in self.logs.iter_mut() {
            // a clock stepping backwards must not break the ordering
            let stamp = log.stamps.back().map_or(now, |&last| last.max(now));
            log.stamps.push_back(stamp);
        }
        AdmitDecision::Allowed
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current usage per window, without mutating state.
    pub fn usage(&self) -> [WindowUsage; 3] {
        Window::ALL.map(|window| self.usage_for(window))
    }

    pub fn usage_for(&self, window: Window) -> WindowUsage {
        let now = self.clock.now();
        let log = &self.logs[window as usize];
        WindowUsage {
            window,
            used: log.live_count(now),
            limit: log.limit,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock advanced by hand, shared between the test and the limiter.
    #[derive(Clone, Default)]
    pub(crate) struct ManualClock {
        millis: Arc<AtomicU64>,
    }

    impl ManualClock {
        pub(crate) fn advance(&self, by: Duration) {
            self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }

        pub(crate) fn rewind(&self, by: Duration) {
            self.millis.fetch_sub(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            Duration::from_millis(self.millis.load(Ordering::SeqCst))
        }
    }

    fn limiter(rpm: usize, rph: usize, rpd: usize) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::default();
        clock.advance(Duration::from_secs(1_000_000));
        let settings = RateLimitSettings {
            rpm,
            rph,
            rpd,
            enabled: true,
        };
        (RateLimiter::with_clock(settings, Box::new(clock.clone())), clock)
    }

    #[test]
    fn test_default_settings() {
        let settings = RateLimitSettings::default();
        assert_eq!((settings.rpm, settings.rph, settings.rpd), (10, 60, 100));
        assert!(settings.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_ceiling_is_rejected() {
        let settings = RateLimitSettings {
            rph: 0,
            ..RateLimitSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_minute_ceiling_denies_with_retry_after() {
        let (mut limiter, clock) = limiter(3, 60, 100);

        for _ in 0..3 {
            assert!(limiter.admit().is_allowed());
            clock.advance(Duration::from_secs(10));
        }

        // oldest entry is 30s old, so it expires in 30s
        assert_eq!(
            limiter.admit(),
            AdmitDecision::Denied {
                window: Window::Minute,
                retry_after: Duration::from_secs(30),
            }
        );
    }

    #[test]
    fn test_entries_expire_out_of_window() {
        let (mut limiter, clock) = limiter(2, 60, 100);
        assert!(limiter.admit().is_allowed());
        assert!(limiter.admit().is_allowed());
        assert!(!limiter.admit().is_allowed());

        clock.advance(Duration::from_secs(60));
        assert!(limiter.admit().is_allowed());
    }

    #[test]
    fn test_hourly_ceiling_blocks_spread_out_burst() {
        let (mut limiter, clock) = limiter(10, 3, 100);

        for _ in 0..3 {
            assert!(limiter.admit().is_allowed());
            clock.advance(Duration::from_secs(61));
        }

        match limiter.admit() {
            AdmitDecision::Denied { window, retry_after } => {
                assert_eq!(window, Window::Hour);
                assert_eq!(retry_after, Duration::from_secs(3600 - 3 * 61));
            }
            AdmitDecision::Allowed => panic!("hourly ceiling should deny"),
        }
    }

    #[test]
    fn test_daily_ceiling() {
        let (mut limiter, clock) = limiter(10, 60, 2);
        assert!(limiter.admit().is_allowed());
        clock.advance(Duration::from_secs(2 * 3600));
        assert!(limiter.admit().is_allowed());
        clock.advance(Duration::from_secs(2 * 3600));

        assert!(matches!(
            limiter.admit(),
            AdmitDecision::Denied { window: Window::Day, .. }
        ));
    }

    /// Admits on an irregular schedule and checks every trailing `window`.
    fn assert_ceiling_holds(rpm: usize, rph: usize, rpd: usize, window: Window, stride: Duration) {
        let (mut limiter, clock) = limiter(rpm, rph, rpd);
        let ceiling = RateLimitSettings { rpm, rph, rpd, enabled: true }.limit(window);
        let mut allowed_at = Vec::new();

        for step in 0..200u32 {
            if limiter.admit().is_allowed() {
                allowed_at.push(clock.now());
            }
            clock.advance(stride * (1 + step % 7));
        }

        assert!(allowed_at.len() > ceiling, "schedule never reached the {} ceiling", window);
        for (i, &start) in allowed_at.iter().enumerate() {
            let in_window = allowed_at[i..]
                .iter()
                .take_while(|&&t| t - start < window.duration())
                .count();
            assert!(in_window <= ceiling, "{} calls allowed within a {}", in_window, window);
        }
    }

    #[test]
    fn test_allowed_count_never_exceeds_ceiling_in_any_trailing_minute() {
        assert_ceiling_holds(4, 1000, 1000, Window::Minute, Duration::from_secs(1));
    }

    #[test]
    fn test_allowed_count_never_exceeds_ceiling_in_any_trailing_hour() {
        assert_ceiling_holds(1000, 5, 1000, Window::Hour, Duration::from_secs(60));
    }

    #[test]
    fn test_allowed_count_never_exceeds_ceiling_in_any_trailing_day() {
        assert_ceiling_holds(1000, 1000, 6, Window::Day, Duration::from_secs(3600));
    }

    #[test]
    fn test_disable_keeps_history_and_reenable_denies() {
        let (mut limiter, clock) = limiter(2, 60, 100);
        assert!(limiter.admit().is_allowed());
        assert!(limiter.admit().is_allowed());

        limiter.set_enabled(false);
        for _ in 0..5 {
            assert!(limiter.admit().is_allowed());
        }

        limiter.set_enabled(true);
        clock.advance(Duration::from_secs(5));
        assert!(matches!(
            limiter.admit(),
            AdmitDecision::Denied { window: Window::Minute, .. }
        ));
        assert_eq!(limiter.usage_for(Window::Minute).used, 2);
    }

    #[test]
    fn test_usage_reports_remaining() {
        let (mut limiter, _clock) = limiter(10, 60, 100);
        limiter.admit();
        limiter.admit();

        let usage = limiter.usage();
        assert_eq!(usage[0].window, Window::Minute);
        assert_eq!(usage[0].used, 2);
        assert_eq!(usage[0].remaining(), 8);
        assert_eq!(usage[2].limit, 100);
    }

    #[test]
    fn test_backwards_clock_keeps_timestamps_ordered() {
        let (mut limiter, clock) = limiter(10, 60, 100);
        limiter.admit();
        clock.rewind(Duration::from_secs(5));
        limiter.admit();

        for log in &limiter.logs {
            let stamps: Vec<_> = log.stamps.iter().collect();
            assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
