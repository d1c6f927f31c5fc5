//! Timestamps and clocks

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock instant with nanosecond resolution (nanoseconds since the Unix epoch)
///
/// `Timestamp::ZERO` doubles as "never".
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch, used as "never happened"
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Convert a `SystemTime`, clamping pre-epoch times to `ZERO`
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Self(u64::try_from(since.as_nanos()).unwrap_or(u64::MAX)),
            Err(_) => Self::ZERO,
        }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("never");
        }
        let nanos = i64::try_from(self.0).unwrap_or(i64::MAX);
        let utc = DateTime::<Utc>::from_timestamp_nanos(nanos);
        write!(f, "{}", utc.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Source of "now" for change records and generation stamps
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by `SystemTime::now()`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_system_time(SystemTime::now())
    }
}

/// Clock that only moves when told to
///
/// Used to drive staleness decisions deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos()),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.nanos.store(at.as_nanos(), Ordering::SeqCst);
    }

    /// Move forward by `nanos` and return the new time
    pub fn advance(&self, nanos: u64) -> Timestamp {
        Timestamp(self.nanos.fetch_add(nanos, Ordering::SeqCst) + nanos)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_never() {
        assert!(Timestamp::ZERO.is_zero());
        assert_eq!(Timestamp::ZERO.to_string(), "never");
        assert_eq!(Timestamp::default(), Timestamp::ZERO);
    }

    #[test]
    fn test_from_system_time() {
        let t = Timestamp::from_system_time(UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(t.as_nanos(), 1_000_000_000);
        assert_eq!(t.to_string(), "1970-01-01 00:00:01.000");

        let before_epoch = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(Timestamp::from_system_time(before_epoch), Timestamp::ZERO);
    }

    #[test]
    fn test_ordering_and_elapsed() {
        let a = Timestamp::from_nanos(10);
        let b = Timestamp::from_nanos(25);
        assert!(a < b);
        assert_eq!(b.saturating_since(a), Duration::from_nanos(15));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(!first.is_zero());
        assert!(second >= first);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Timestamp::from_nanos(5));
        assert_eq!(clock.now().as_nanos(), 5);
        assert_eq!(clock.advance(3).as_nanos(), 8);
        clock.set(Timestamp::from_nanos(100));
        assert_eq!(clock.now().as_nanos(), 100);
    }
}
