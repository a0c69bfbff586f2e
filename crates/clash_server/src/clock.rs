//! Wall-clock access.
//!
//! Timestamps are milliseconds since the Unix epoch. Every deadline in the
//! service is compared against [`Clock::now_ms`], so tests swap in a
//! [`ManualClock`] and step time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now_ms(&self) -> Millis;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start at `start` milliseconds.
    #[must_use]
    pub const fn new(start: Millis) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.now.fetch_add(secs * 1000, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Milliseconds between two timestamps, zero if `later` is earlier.
#[must_use]
pub const fn elapsed_ms(earlier: Millis, later: Millis) -> u64 {
    later.saturating_sub(earlier)
}

/// Whole seconds between two timestamps, for display. Compare thresholds
/// with [`elapsed_ms`]: this rounds down.
#[must_use]
pub const fn secs_between(earlier: Millis, later: Millis) -> u64 {
    elapsed_ms(earlier, later) / 1000
}

/// A duration in seconds, as milliseconds.
#[must_use]
pub const fn secs_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}
