//! Event filter: raw path notifications in, change records out

use crate::ignore::IgnoreRules;
use mapwatch_core::{ChangeRecord, Clock, QueueError, QueueSender, SourceKey, Timestamp};
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Turns candidate paths into change records
///
/// Only paths whose extension matches the source extension
/// (case-insensitively) and that no ignore rule rejects produce a record.
/// Everything else is dropped silently.
pub struct EventFilter {
    /// Lowercase, without the leading dot
    extension: String,
    ignore: Option<IgnoreRules>,
    clock: Arc<dyn Clock>,
}

impl EventFilter {
    pub fn new(extension: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            ignore: None,
            clock,
        }
    }

    /// Also reject paths matched by `rules`
    pub fn with_ignore_rules(mut self, rules: IgnoreRules) -> Self {
        self.ignore = Some(rules);
        self
    }

    /// Whether `path` names a source file worth coordinating
    pub fn accepts(&self, path: &Path) -> bool {
        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
        if !matches_extension {
            return false;
        }

        match &self.ignore {
            Some(rules) => !rules.should_ignore(path),
            None => true,
        }
    }

    /// Wrap `path` into a record observed at `observed_at`, or drop it
    pub fn filter(&self, path: &Path, observed_at: Timestamp) -> Option<ChangeRecord> {
        if !self.accepts(path) {
            trace!(path = %path.display(), "ignoring non-source path");
            return None;
        }
        Some(ChangeRecord::new(SourceKey::from_path(path), observed_at))
    }

    /// Stamp `path` with the current time, filter it, and enqueue the result
    ///
    /// Blocks while the queue is full. Returns whether a record was enqueued.
    pub fn submit(&self, path: &Path, queue: &QueueSender) -> Result<bool, QueueError> {
        let Some(record) = self.filter(path, self.clock.now()) else {
            return Ok(false);
        };
        trace!(key = %record.key, observed_at = %record.observed_at, "enqueueing change");
        queue.send(record)?;
        Ok(true)
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}
