//! Single-flight generation coordinator
//!
//! For each dequeued record the coordinator either generates, discards the
//! record as stale, or defers it because a generation for the same key is
//! already running. `last_completed` is stamped before the adapter runs, so
//! changes observed while a render is in progress, but before the stamp,
//! count as satisfied by it.

use crate::deferred::DeferredSet;
use crate::stats::{CoordinatorStats, StatsSnapshot};
use crate::store::GenerationStore;
use crossbeam_channel::{select, Receiver};
use mapwatch_core::{
    ChangeRecord, Clock, DeferPolicy, GenerationReport, QueueReceiver, QueueSender, RenderAdapter,
    RenderError, Timestamp,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long the loop sleeps with nothing queued and nothing parked
const IDLE_TICK: Duration = Duration::from_millis(500);

/// Shortest wait between deferred-set flushes
const MIN_TICK: Duration = Duration::from_millis(1);

/// What happened to one record
#[derive(Debug)]
pub enum Disposition {
    /// The adapter ran and succeeded
    Generated(GenerationReport),
    /// The adapter ran and failed; not retried
    Failed(RenderError),
    /// Already satisfied by a generation stamped at `last_completed`
    Stale { last_completed: Timestamp },
    /// Key was busy; the record must go back on the queue
    Deferred(ChangeRecord),
}

pub struct Coordinator<A> {
    store: GenerationStore,
    adapter: A,
    clock: Arc<dyn Clock>,
    policy: DeferPolicy,
    stats: CoordinatorStats,
}

impl<A: RenderAdapter> Coordinator<A> {
    pub fn new(adapter: A, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: GenerationStore::new(),
            adapter,
            clock,
            policy: DeferPolicy::Immediate,
            stats: CoordinatorStats::new(),
        }
    }

    pub fn with_defer_policy(mut self, policy: DeferPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Decide and act on one record
    ///
    /// Safe to call from several threads; at most one generation per key
    /// runs at any time.
    pub fn process(&self, record: ChangeRecord) -> Disposition {
        let Some(_busy) = self.store.try_acquire(&record.key) else {
            debug!("{} is busy, deferring", record.key);
            self.stats.record_deferred();
            return Disposition::Deferred(record);
        };

        let stamp = self
            .store
            .stamp_if_fresh(&record.key, record.observed_at, self.clock.now());
        if !stamp.accepted {
            debug!(
                "Skipping stale change to {} (observed {}, last generated {})",
                record.key, record.observed_at, stamp.previous
            );
            self.stats.record_stale();
            return Disposition::Stale {
                last_completed: stamp.previous,
            };
        }

        info!("Generating {}", record.key);
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.adapter.generate(&record.key)))
            .unwrap_or_else(|payload| Err(RenderError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(report) => {
                info!(
                    "Generated {} ({} artifacts in {:?})",
                    record.key,
                    report.artifacts.len(),
                    started.elapsed()
                );
                self.stats.record_generated();
                Disposition::Generated(report)
            }
            Err(err) => {
                error!("Generation failed for {}: {}", record.key, err);
                self.stats.record_failed(format!("{}: {}", record.key, err));
                Disposition::Failed(err)
            }
        }
    }

    /// Consume `queue` until `shutdown` fires or its sender is dropped
    ///
    /// Deferred records go back onto `requeue`, which must feed `queue`.
    /// On shutdown every record still queued or parked is processed before
    /// returning.
    pub fn run(
        &self,
        queue: &QueueReceiver,
        requeue: &QueueSender,
        shutdown: &Receiver<()>,
    ) -> StatsSnapshot {
        let mut deferred = DeferredSet::new();
        info!("Coordinator started ({:?} deferral)", self.policy);

        loop {
            let now = Instant::now();
            deferred.flush_due(now, requeue);
            let wait = deferred
                .next_due_in(now)
                .map(|d| d.max(MIN_TICK))
                .unwrap_or(IDLE_TICK);

            select! {
                recv(queue.channel()) -> msg => match msg {
                    Ok(record) => self.dispatch(record, &mut deferred, requeue),
                    Err(_) => {
                        warn!("Event queue closed, coordinator stopping");
                        break;
                    }
                },
                recv(shutdown) -> _ => {
                    debug!("Shutdown requested, draining {} queued records", queue.len());
                    break;
                }
                default(wait) => {}
            }
        }

        self.drain(queue, &mut deferred);
        let stats = self.stats.snapshot();
        info!(
            "Coordinator stopped: {} generated, {} failed, {} stale, {} deferrals",
            stats.generated, stats.failed, stats.stale, stats.deferred
        );
        stats
    }

    fn dispatch(&self, record: ChangeRecord, deferred: &mut DeferredSet, requeue: &QueueSender) {
        let Disposition::Deferred(record) = self.process(record) else {
            return;
        };
        let now = Instant::now();
        match self.policy {
            DeferPolicy::Immediate => {
                // Straight to the tail when there is room
                if let Err(err) = requeue.try_send(record) {
                    deferred.park(now, err.into_record());
                }
            }
            DeferPolicy::Backoff(delay) => deferred.park(now + delay, record),
        }
    }

    /// Process everything left in the queue and the deferred set
    fn drain(&self, queue: &QueueReceiver, deferred: &mut DeferredSet) {
        loop {
            let mut progressed = false;

            while let Ok(Some(record)) = queue.try_recv() {
                progressed = true;
                if let Disposition::Deferred(record) = self.process(record) {
                    deferred.park(Instant::now(), record);
                }
            }

            let parked = deferred.take_all();
            if parked.is_empty() {
                return;
            }
            for record in parked {
                match self.process(record) {
                    Disposition::Deferred(record) => deferred.park(Instant::now(), record),
                    _ => progressed = true,
                }
            }

            if !progressed {
                // Another thread holds the key; let it finish
                thread::yield_now();
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn store(&self) -> &GenerationStore {
        &self.store
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn policy(&self) -> DeferPolicy {
        self.policy
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapwatch_core::{ManualClock, SourceKey};
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};

    /// Records every call and succeeds
    #[derive(Default)]
    struct RecordingAdapter {
        calls: Mutex<Vec<PathBuf>>,
    }

    impl RenderAdapter for RecordingAdapter {
        fn generate(&self, key: &SourceKey) -> Result<GenerationReport, RenderError> {
            self.calls.lock().push(key.as_path().to_path_buf());
            Ok(GenerationReport::new(vec![PathBuf::from("out.png")]))
        }
    }

    struct FailingAdapter;

    impl RenderAdapter for FailingAdapter {
        fn generate(&self, key: &SourceKey) -> Result<GenerationReport, RenderError> {
            Err(RenderError::Malformed {
                path: key.as_path().to_path_buf(),
                message: "missing <map> element".to_string(),
            })
        }
    }

    struct PanickingAdapter;

    impl RenderAdapter for PanickingAdapter {
        fn generate(&self, _key: &SourceKey) -> Result<GenerationReport, RenderError> {
            panic!("tileset index out of range");
        }
    }

    fn key(name: &str) -> SourceKey {
        SourceKey::from_path(&Path::new("/maps").join(name))
    }

    fn ts(nanos: u64) -> Timestamp {
        Timestamp::from_nanos(nanos)
    }

    fn coordinator<A: RenderAdapter>(adapter: A, now: u64) -> (Coordinator<A>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(ts(now)));
        let coordinator = Coordinator::new(adapter, clock.clone() as Arc<dyn Clock>);
        (coordinator, clock)
    }

    #[test]
    fn test_fresh_record_generates_and_stamps() {
        let (coord, _clock) = coordinator(RecordingAdapter::default(), 100);

        let disposition = coord.process(ChangeRecord::new(key("town.tmx"), ts(50)));
        assert!(matches!(disposition, Disposition::Generated(ref r) if r.artifacts.len() == 1));
        assert_eq!(coord.store().last_completed(&key("town.tmx")), ts(100));
        assert!(!coord.store().is_busy(&key("town.tmx")));
        assert_eq!(coord.adapter().calls.lock().len(), 1);
    }

    #[test]
    fn test_record_at_or_before_stamp_is_stale() {
        let (coord, clock) = coordinator(RecordingAdapter::default(), 100);
        coord.process(ChangeRecord::new(key("town.tmx"), ts(50)));
        clock.set(ts(200));

        for observed in [ts(60), ts(100)] {
            match coord.process(ChangeRecord::new(key("town.tmx"), observed)) {
                Disposition::Stale { last_completed } => assert_eq!(last_completed, ts(100)),
                other => panic!("expected stale, got {:?}", other),
            }
        }

        // Strictly after the stamp is fresh again
        assert!(matches!(
            coord.process(ChangeRecord::new(key("town.tmx"), ts(101))),
            Disposition::Generated(_)
        ));
        assert_eq!(coord.adapter().calls.lock().len(), 2);
        assert_eq!(coord.stats().stale, 2);
    }

    #[test]
    fn test_busy_key_defers_without_calling_adapter() {
        let (coord, _clock) = coordinator(RecordingAdapter::default(), 100);
        let town = key("town.tmx");

        assert!(coord.store().try_enter_busy(&town));
        let record = ChangeRecord::new(town.clone(), ts(50));
        match coord.process(record.clone()) {
            Disposition::Deferred(returned) => assert_eq!(returned, record),
            other => panic!("expected deferral, got {:?}", other),
        }
        assert!(coord.adapter().calls.lock().is_empty());
        assert_eq!(coord.store().last_completed(&town), Timestamp::ZERO);

        coord.store().leave_busy(&town);
        assert!(matches!(coord.process(record), Disposition::Generated(_)));
    }

    #[test]
    fn test_failure_releases_key_and_is_not_retried() {
        let (coord, clock) = coordinator(FailingAdapter, 100);
        let town = key("town.tmx");

        let disposition = coord.process(ChangeRecord::new(town.clone(), ts(50)));
        assert!(matches!(disposition, Disposition::Failed(RenderError::Malformed { .. })));
        assert!(!coord.store().is_busy(&town));

        // The stamp stands: the same change is not retried
        assert!(matches!(
            coord.process(ChangeRecord::new(town.clone(), ts(50))),
            Disposition::Stale { .. }
        ));

        // A later change tries again
        clock.set(ts(300));
        assert!(matches!(
            coord.process(ChangeRecord::new(town, ts(200))),
            Disposition::Failed(_)
        ));

        let stats = coord.stats();
        assert_eq!(stats.failed, 2);
        assert!(stats.last_failure.unwrap().contains("missing <map> element"));
    }

    #[test]
    fn test_panic_becomes_failure() {
        let (coord, _clock) = coordinator(PanickingAdapter, 100);
        let town = key("town.tmx");

        match coord.process(ChangeRecord::new(town.clone(), ts(50))) {
            Disposition::Failed(RenderError::Panicked(message)) => {
                assert_eq!(message, "tileset index out of range");
            }
            other => panic!("expected panic failure, got {:?}", other),
        }
        assert!(!coord.store().is_busy(&town));
    }

    #[test]
    fn test_failing_key_does_not_block_other_keys() {
        struct SelectiveAdapter;
        impl RenderAdapter for SelectiveAdapter {
            fn generate(&self, key: &SourceKey) -> Result<GenerationReport, RenderError> {
                if key.file_stem() == Some("broken") {
                    Err(RenderError::Unsupported {
                        path: key.as_path().to_path_buf(),
                        feature: "infinite maps".to_string(),
                    })
                } else {
                    Ok(GenerationReport::default())
                }
            }
        }

        let (coord, _clock) = coordinator(SelectiveAdapter, 100);
        assert!(matches!(
            coord.process(ChangeRecord::new(key("broken.tmx"), ts(50))),
            Disposition::Failed(_)
        ));
        assert!(matches!(
            coord.process(ChangeRecord::new(key("town.tmx"), ts(50))),
            Disposition::Generated(_)
        ));
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u32), "unknown panic");
    }
}
