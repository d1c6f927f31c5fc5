//! Per-key generation state
//!
//! One `GenerationState` per source key, created on first sighting and kept
//! for the life of the process. The map only guards lookup-or-create; the
//! busy flag is an atomic of its own, so racing callers that both resolved
//! the same state still contend on a single compare-and-swap.

use dashmap::DashMap;
use mapwatch_core::{SourceKey, Timestamp};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Generation bookkeeping for one key
#[derive(Debug, Default)]
pub struct GenerationState {
    /// True while a generation for this key is executing
    in_flight: AtomicBool,
    /// Nanoseconds of the last accepted generation; 0 = never
    last_completed: AtomicU64,
}

impl GenerationState {
    fn try_enter(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn leave(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    fn last_completed(&self) -> Timestamp {
        Timestamp::from_nanos(self.last_completed.load(Ordering::Acquire))
    }
}

/// Result of a staleness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// `last_completed` before this check
    pub previous: Timestamp,
    /// Whether the record was fresh and `last_completed` was advanced
    pub accepted: bool,
}

/// Concurrency-safe keyed store of generation state
#[derive(Debug, Default)]
pub struct GenerationStore {
    states: DashMap<SourceKey, Arc<GenerationState>>,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup-or-create the state for `key`
    fn state(&self, key: &SourceKey) -> Arc<GenerationState> {
        if let Some(state) = self.states.get(key) {
            return Arc::clone(state.value());
        }
        let state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| Arc::new(GenerationState::default()));
        Arc::clone(state.value())
    }

    /// Atomically mark `key` busy; false if a generation is already in flight
    pub fn try_enter_busy(&self, key: &SourceKey) -> bool {
        self.state(key).try_enter()
    }

    /// Mark `key` idle again
    pub fn leave_busy(&self, key: &SourceKey) {
        self.state(key).leave();
    }

    /// Mark `key` busy and return a guard that releases it on drop
    pub fn try_acquire(&self, key: &SourceKey) -> Option<BusyGuard> {
        let state = self.state(key);
        if state.try_enter() {
            Some(BusyGuard { state })
        } else {
            None
        }
    }

    /// Compare `observed_at` against the last generation of `key`
    ///
    /// A record is fresh only if it was observed strictly after the last
    /// accepted generation. When fresh, `last_completed` is advanced to
    /// `now` (never backwards, even if the wall clock was). Callers are
    /// expected to hold the key busy.
    pub fn stamp_if_fresh(&self, key: &SourceKey, observed_at: Timestamp, now: Timestamp) -> Stamp {
        let state = self.state(key);
        let previous = state.last_completed();
        if observed_at <= previous {
            return Stamp {
                previous,
                accepted: false,
            };
        }
        state
            .last_completed
            .fetch_max(now.as_nanos(), Ordering::AcqRel);
        Stamp {
            previous,
            accepted: true,
        }
    }

    pub fn last_completed(&self, key: &SourceKey) -> Timestamp {
        self.states
            .get(key)
            .map(|state| state.last_completed())
            .unwrap_or(Timestamp::ZERO)
    }

    pub fn is_busy(&self, key: &SourceKey) -> bool {
        self.states
            .get(key)
            .is_some_and(|state| state.in_flight.load(Ordering::Acquire))
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Holds a key busy; releases it when dropped, including during unwinding
#[derive(Debug)]
pub struct BusyGuard {
    state: Arc<GenerationState>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.state.leave();
    }
}
