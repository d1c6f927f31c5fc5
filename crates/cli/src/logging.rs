//! Logging setup for the mapwatch binary
//!
//! Console output always goes to stderr. With `--log-file`, records are
//! also written (without ANSI colors) to that file through a non-blocking
//! writer; the file is truncated at startup.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keeps the file writer alive; dropping it flushes the log file
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Level from the `-v`/`-q` flags
///
/// Default is INFO; each `-v` raises it one step, `-q` shows errors only.
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<LoggingGuard> {
    let mut file_guard = None;

    let file_layer = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            fs::write(path, "")
                .with_context(|| format!("Failed to truncate log file {}", path.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(level)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install logging subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
