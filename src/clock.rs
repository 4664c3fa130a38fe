//! Time sources for the ledger.
//!
//! Timestamps are plain `u64` milliseconds. The ledger never trusts a clock
//! to be monotonic on its own; it clamps every reading to the largest value
//! it has seen (see [`crate::ledger::BurnLedger`]).

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Milliseconds. Wall-clock readings are relative to the Unix epoch.
pub type Timestamp = u64;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// Logical clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Moves the clock forward by `ms` and returns the new reading.
    pub fn advance(&self, ms: u64) -> Timestamp {
        let prev = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(ms))
            })
            .unwrap_or_else(|t| t);
        prev.saturating_add(ms)
    }

    /// Moves the clock to `ts` unless it is already past it.
    pub fn advance_to(&self, ts: Timestamp) -> Timestamp {
        let prev = self.now.fetch_max(ts, Ordering::SeqCst);
        prev.max(ts)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn manual_clock_advances_and_never_rewinds() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.advance(50), 150);
        assert_eq!(clock.advance_to(120), 150);
        assert_eq!(clock.advance_to(400), 400);
        assert_eq!(clock.now(), 400);
    }

    #[test]
    fn shared_manual_clock_is_seen_through_arc() {
        let clock = Arc::new(ManualClock::new(0));
        let view: Arc<ManualClock> = Arc::clone(&clock);
        clock.advance(6_000);
        assert_eq!(view.now(), 6_000);
    }

    #[test]
    fn system_clock_is_past_the_epoch() {
        assert!(SystemClock.now() > 1_600_000_000_000);
    }
}
