//! Continuous filesystem watch on the source directory
//!
//! The notify callback runs on the watcher's own thread and submits
//! qualifying paths straight into the event queue, so a full queue stalls
//! the watcher rather than buffering without bound.

use crate::filter::EventFilter;
use anyhow::{Context, Result};
use mapwatch_core::QueueSender;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Live subscription to source directory changes
///
/// Events stop when this is dropped.
pub struct SourceWatcher {
    /// Watcher handle (must be kept alive)
    _watcher: RecommendedWatcher,
    source_dir: PathBuf,
}

impl SourceWatcher {
    /// Subscribe to create/write events under `source_dir`
    ///
    /// Failing to establish the subscription is an error; errors reported
    /// later by the OS are logged and the watch keeps running.
    pub fn start(
        source_dir: &Path,
        recursive: bool,
        filter: Arc<EventFilter>,
        queue: QueueSender,
    ) -> Result<Self> {
        let queue_closed = AtomicBool::new(false);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    debug!("fs event: {:?} {:?}", event.kind, event.paths);
                    for path in &event.paths {
                        if filter.submit(path, &queue).is_err() {
                            // Report once; the coordinator is gone for good
                            if !queue_closed.swap(true, Ordering::Relaxed) {
                                error!("Event queue closed, dropping filesystem events");
                            }
                            return;
                        }
                    }
                }
                Err(e) => warn!("Watch error: {}", e),
            }
        })
        .context("Failed to create filesystem watcher")?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(source_dir, mode)
            .with_context(|| format!("Failed to watch {}", source_dir.display()))?;

        info!("Watching {} for changes", source_dir.display());

        Ok(Self {
            _watcher: watcher,
            source_dir: source_dir.to_path_buf(),
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}

/// Whether an event means a file's content may have changed
///
/// Creations, data writes and rename targets count (editors often save via
/// rename). Metadata-only changes, accesses and removals do not.
pub fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(ModifyKind::Name(mode)) => {
            matches!(mode, RenameMode::To | RenameMode::Both | RenameMode::Any)
        }
        EventKind::Modify(_) => true,
        _ => false,
    }
}
