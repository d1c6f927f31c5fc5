//! Outcome counters for the coordinator

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals, updated from whichever thread processed the record
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    generated: AtomicU64,
    failed: AtomicU64,
    stale: AtomicU64,
    deferred: AtomicU64,
    last_failure: Mutex<Option<String>>,
}

/// Point-in-time copy of [`CoordinatorStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub generated: u64,
    pub failed: u64,
    pub stale: u64,
    /// Deferrals, not distinct records: a record deferred twice counts twice
    pub deferred: u64,
    pub last_failure: Option<String>,
}

impl StatsSnapshot {
    /// Records that reached a final outcome
    pub fn handled(&self) -> u64 {
        self.generated + self.failed + self.stale
    }
}

impl CoordinatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_generated(&self) {
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, message: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(message);
    }

    pub(crate) fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            generated: self.generated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            last_failure: self.last_failure.lock().clone(),
        }
    }
}
