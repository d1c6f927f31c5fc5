//! Wiring of change sources, event queue and coordinator
//!
//! The coordinator runs on its own thread from `start` until `shutdown`.
//! Change sources (the startup scan and the live watch) feed the queue from
//! the calling thread and the notify thread respectively.

use anyhow::{anyhow, Context, Result};
use coordinator::{Coordinator, StatsSnapshot};
use crossbeam_channel::Sender;
use mapwatch_core::{event_queue, Clock, QueueSender, RenderAdapter, SystemClock, WatchConfig};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use watcher::{EventFilter, IgnoreRules, InitialScan, ScanSummary, SourceWatcher};

pub struct Pipeline<A: RenderAdapter + 'static> {
    config: WatchConfig,
    filter: Arc<EventFilter>,
    queue: QueueSender,
    coordinator: Arc<Coordinator<A>>,
    shutdown: Sender<()>,
    worker: Option<JoinHandle<StatsSnapshot>>,
    watcher: Option<SourceWatcher>,
}

impl<A: RenderAdapter + 'static> Pipeline<A> {
    /// Build the queue and filter, and start the coordinator thread
    pub fn start(config: WatchConfig, adapter: A) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let rules = IgnoreRules::load(
            &config.source_dir,
            config.use_ignore_file,
            &config.ignore_patterns,
        )?;
        let filter = Arc::new(
            EventFilter::new(&config.normalized_extension(), clock.clone()).with_ignore_rules(rules),
        );

        let (queue, receiver) = event_queue(config.queue_capacity);
        let coordinator =
            Arc::new(Coordinator::new(adapter, clock).with_defer_policy(config.defer_policy()));
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(1);

        let worker = {
            let coordinator = coordinator.clone();
            let requeue = queue.clone();
            thread::Builder::new()
                .name("mapwatch-coordinator".to_string())
                .spawn(move || coordinator.run(&receiver, &requeue, &shutdown_rx))
                .context("Failed to spawn coordinator thread")?
        };

        debug!(
            "Pipeline started: {} -> {} (queue capacity {})",
            config.source_dir.display(),
            config.dest_dir.display(),
            config.queue_capacity
        );

        Ok(Self {
            config,
            filter,
            queue,
            coordinator,
            shutdown,
            worker: Some(worker),
            watcher: None,
        })
    }

    /// Enqueue every qualifying file already in the source directory
    pub fn scan(&self) -> Result<ScanSummary> {
        let summary = InitialScan::new(&self.config.source_dir, self.config.recursive)
            .run(&self.filter, &self.queue)?;
        info!(
            "Initial scan: {} files, {} queued",
            summary.files_seen, summary.enqueued
        );
        Ok(summary)
    }

    /// Begin the live watch; changes flow until `shutdown`
    pub fn watch(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        let watcher = SourceWatcher::start(
            &self.config.source_dir,
            self.config.recursive,
            self.filter.clone(),
            self.queue.clone(),
        )?;
        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.coordinator.stats()
    }

    /// Records waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether the coordinator thread is still consuming
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(false, |worker| !worker.is_finished())
    }

    /// Stop watching, let the coordinator drain, and return final totals
    pub fn shutdown(mut self) -> Result<StatsSnapshot> {
        // No new events once the watcher is gone
        self.watcher.take();
        let _ = self.shutdown.try_send(());

        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("Coordinator already stopped"))?;
        worker
            .join()
            .map_err(|_| anyhow!("Coordinator thread panicked"))
    }
}

impl<A: RenderAdapter + 'static> Drop for Pipeline<A> {
    fn drop(&mut self) {
        self.watcher.take();
        if let Some(worker) = self.worker.take() {
            let _ = self.shutdown.try_send(());
            let _ = worker.join();
        }
    }
}
