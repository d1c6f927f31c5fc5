//! Records waiting to go back onto the event queue
//!
//! The coordinator is the queue's only consumer, so it must never block
//! sending to it. Deferred records are parked here until they are due and
//! the queue has room.

use mapwatch_core::{ChangeRecord, QueueSender, TryEnqueueError};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::error;

#[derive(Debug, Default)]
pub struct DeferredSet {
    /// Ordered by due time
    pending: VecDeque<(Instant, ChangeRecord)>,
}

impl DeferredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `record` until `due`
    pub fn park(&mut self, due: Instant, record: ChangeRecord) {
        // Keep due order; a record never overtakes an earlier one
        let due = match self.pending.back() {
            Some((last, _)) if *last > due => *last,
            _ => due,
        };
        self.pending.push_back((due, record));
    }

    /// Move every due record onto the queue tail, stopping at the first
    /// record that does not fit. Returns how many were moved.
    pub fn flush_due(&mut self, now: Instant, queue: &QueueSender) -> usize {
        let mut moved = 0;
        while let Some((due, _)) = self.pending.front() {
            if *due > now {
                break;
            }
            let Some((due, record)) = self.pending.pop_front() else {
                break;
            };
            match queue.try_send(record) {
                Ok(()) => moved += 1,
                Err(TryEnqueueError::Full(record)) => {
                    self.pending.push_front((due, record));
                    break;
                }
                Err(TryEnqueueError::Closed(record)) => {
                    error!("Event queue closed, holding deferred record for {}", record.key);
                    self.pending.push_front((due, record));
                    break;
                }
            }
        }
        moved
    }

    /// How long until the earliest record is due; `None` when empty
    pub fn next_due_in(&self, now: Instant) -> Option<Duration> {
        self.pending
            .front()
            .map(|(due, _)| due.saturating_duration_since(now))
    }

    /// Remove and return every parked record regardless of due time
    pub fn take_all(&mut self) -> Vec<ChangeRecord> {
        self.pending.drain(..).map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
