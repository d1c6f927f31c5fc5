//! Startup scan
//!
//! Enumerates the source files already present in the source directory so
//! every existing map is generated once before watching begins.

use crate::filter::EventFilter;
use anyhow::{Context, Result};
use mapwatch_core::QueueSender;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One-shot scan of the source directory
pub struct InitialScan {
    /// Source directory
    source_dir: PathBuf,

    /// Descend into subdirectories
    recursive: bool,
}

/// What a scan found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Files looked at
    pub files_seen: usize,
    /// Files that passed the filter and were enqueued
    pub enqueued: usize,
}

impl InitialScan {
    pub fn new(source_dir: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            source_dir: source_dir.into(),
            recursive,
        }
    }

    /// Run the scan, enqueueing a record for every source file found
    ///
    /// Failing to open the source directory is an error; unreadable entries
    /// below it are logged and skipped. Blocks whenever the queue is full.
    pub fn run(&self, filter: &EventFilter, queue: &QueueSender) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();

        info!("Scanning {}", self.source_dir.display());

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&self.source_dir)
            .follow_links(true)
            .max_depth(max_depth)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(e).with_context(|| {
                        format!("Failed to open source directory {}", self.source_dir.display())
                    });
                }
                Err(e) => {
                    warn!("Skipping unreadable entry during scan: {}", e);
                    continue;
                }
            };

            // Only check files
            if !entry.file_type().is_file() {
                continue;
            }

            summary.files_seen += 1;
            if filter
                .submit(entry.path(), queue)
                .context("Event queue closed during initial scan")?
            {
                summary.enqueued += 1;
            }
        }

        debug!(
            "Scan of {} done: {} files, {} enqueued",
            self.source_dir.display(),
            summary.files_seen,
            summary.enqueued
        );

        Ok(summary)
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}
