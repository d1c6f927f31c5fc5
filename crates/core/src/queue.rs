//! Bounded FIFO of change records
//!
//! Producers (initial scan, filesystem watch) block when the queue is full,
//! which throttles them to the coordinator's pace. Exactly one coordinator
//! loop consumes the receiving end. Records the coordinator defers are
//! appended to the tail like any other arrival.

use crate::error::{QueueError, TryEnqueueError};
use crate::record::ChangeRecord;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::time::Duration;

/// Default number of records buffered between producers and the coordinator
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Create a bounded event queue
pub fn event_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = bounded(capacity);
    (
        QueueSender { tx, capacity },
        QueueReceiver { rx },
    )
}

/// Producer handle; cheap to clone
#[derive(Clone, Debug)]
pub struct QueueSender {
    tx: Sender<ChangeRecord>,
    capacity: usize,
}

impl QueueSender {
    /// Enqueue, blocking while the queue is full
    pub fn send(&self, record: ChangeRecord) -> Result<(), QueueError> {
        self.tx.send(record).map_err(|_| QueueError::Closed)
    }

    /// Enqueue without blocking; hands the record back on failure
    pub fn try_send(&self, record: ChangeRecord) -> Result<(), TryEnqueueError> {
        self.tx.try_send(record).map_err(|err| match err {
            TrySendError::Full(record) => TryEnqueueError::Full(record),
            TrySendError::Disconnected(record) => TryEnqueueError::Closed(record),
        })
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer handle, owned by the coordinator loop
#[derive(Debug)]
pub struct QueueReceiver {
    rx: Receiver<ChangeRecord>,
}

impl QueueReceiver {
    /// Dequeue, blocking while the queue is empty
    pub fn recv(&self) -> Result<ChangeRecord, QueueError> {
        self.rx.recv().map_err(|_| QueueError::Closed)
    }

    /// Dequeue, waiting at most `timeout`; `Ok(None)` on timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ChangeRecord>, QueueError> {
        match self.rx.recv_timeout(timeout) {
            Ok(record) => Ok(Some(record)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Closed),
        }
    }

    /// Dequeue without blocking; `Ok(None)` when empty
    pub fn try_recv(&self) -> Result<Option<ChangeRecord>, QueueError> {
        match self.rx.try_recv() {
            Ok(record) => Ok(Some(record)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(QueueError::Closed),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Underlying channel, for use in `crossbeam_channel::select!`
    pub fn channel(&self) -> &Receiver<ChangeRecord> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SourceKey;
    use crate::time::Timestamp;
    use std::path::Path;
    use std::thread;

    fn record(name: &str, at: u64) -> ChangeRecord {
        ChangeRecord::new(
            SourceKey::from_path(Path::new("/maps").join(name).as_path()),
            Timestamp::from_nanos(at),
        )
    }

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = event_queue(8);
        tx.send(record("a.tmx", 1)).unwrap();
        tx.send(record("b.tmx", 2)).unwrap();
        tx.send(record("a.tmx", 3)).unwrap();

        let order: Vec<u64> = (0..3)
            .map(|_| rx.recv().unwrap().observed_at.as_nanos())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(rx.try_recv().unwrap(), None);
    }

    #[test]
    fn test_try_send_hands_record_back_when_full() {
        let (tx, rx) = event_queue(1);
        assert_eq!(tx.capacity(), 1);
        tx.try_send(record("a.tmx", 1)).unwrap();

        match tx.try_send(record("b.tmx", 2)) {
            Err(TryEnqueueError::Full(returned)) => {
                assert_eq!(returned.observed_at.as_nanos(), 2);
            }
            other => panic!("expected Full, got {:?}", other),
        }

        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_send_blocks_until_space() {
        let (tx, rx) = event_queue(1);
        tx.send(record("a.tmx", 1)).unwrap();

        let producer = {
            let tx = tx.clone();
            thread::spawn(move || tx.send(record("b.tmx", 2)))
        };

        // Producer is parked on the full queue until we drain one record
        assert_eq!(rx.recv().unwrap().observed_at.as_nanos(), 1);
        assert_eq!(rx.recv().unwrap().observed_at.as_nanos(), 2);
        producer.join().unwrap().unwrap();
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = event_queue(4);
        drop(rx);
        assert_eq!(tx.send(record("a.tmx", 1)), Err(QueueError::Closed));

        let (tx, rx) = event_queue(4);
        drop(tx);
        assert_eq!(rx.recv(), Err(QueueError::Closed));
        assert_eq!(rx.recv_timeout(Duration::from_millis(1)), Err(QueueError::Closed));
    }

    #[test]
    fn test_recv_timeout_returns_none_when_idle() {
        let (_tx, rx) = event_queue(4);
        assert_eq!(rx.recv_timeout(Duration::from_millis(5)).unwrap(), None);
    }
}
