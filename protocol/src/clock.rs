//! # Time Sources
//!
//! The penalty schedule is a function of elapsed time, so every component
//! that needs "now" gets it from an injected [`Clock`] instead of calling
//! `Utc::now()` itself. Production uses [`SystemClock`]; tests and the
//! scenario simulator use [`ManualClock`] and move time by hand.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::RwLock;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant. Read once per vault operation.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can hand one clone
/// to the vault and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Start the clock at the Unix epoch. Deterministic, and far enough
    /// from any real date that a leaked wall-clock read stands out.
    pub fn at_epoch() -> Self {
        Self::new(Utc.timestamp_opt(0, 0).single().unwrap_or_default())
    }

    /// Move the clock forward (or backward, for a negative duration).
    ///
    /// # Panics
    ///
    /// If the result falls outside chrono's representable range. Use
    /// [`ManualClock::try_advance`] for untrusted durations.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }

    /// Like [`ManualClock::advance`], but leaves the clock untouched and
    /// returns `None` when the result would be out of range.
    pub fn try_advance(&self, by: Duration) -> Option<DateTime<Utc>> {
        let mut now = self.now.write();
        let next = now.checked_add_signed(by)?;
        *now = next;
        Some(next)
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_epoch()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
