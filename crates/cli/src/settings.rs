//! Effective configuration: config file, then command-line overrides

use anyhow::{Context, Result};
use clap::Args;
use mapwatch_core::config::CONFIG_FILE_NAME;
use mapwatch_core::WatchConfig;
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over the config file
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Directory holding the source maps
    #[arg(long, global = true, value_name = "DIR")]
    pub map: Option<PathBuf>,

    /// Directory receiving generated images
    #[arg(long, global = true, value_name = "DIR")]
    pub dst: Option<PathBuf>,

    /// Write one image per top-level group instead of one merged image
    #[arg(long, global = true)]
    pub separate_groups: bool,

    /// Source file extension (without the dot)
    #[arg(long, global = true, value_name = "EXT")]
    pub extension: Option<String>,

    /// Include subdirectories of the source directory
    #[arg(short, long, global = true)]
    pub recursive: bool,

    /// Capacity of the event queue
    #[arg(long, global = true, value_name = "N")]
    pub queue_capacity: Option<usize>,

    /// Delay before re-enqueueing a deferred change, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub retry_backoff_ms: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut WatchConfig) {
        if let Some(map) = &self.map {
            config.source_dir = map.clone();
        }
        if let Some(dst) = &self.dst {
            config.dest_dir = dst.clone();
        }
        if self.separate_groups {
            config.separate_groups = true;
        }
        if let Some(extension) = &self.extension {
            config.extension = extension.clone();
        }
        if self.recursive {
            config.recursive = true;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(backoff) = self.retry_backoff_ms {
            config.retry_backoff_ms = backoff;
        }
    }
}

/// Build the effective configuration
///
/// An explicit `config_path` must exist; otherwise `mapwatch.toml` in the
/// working directory is used when present.
pub fn resolve(config_path: Option<&Path>, overrides: &Overrides) -> Result<WatchConfig> {
    let mut config = match config_path {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::load_or_default(Path::new(CONFIG_FILE_NAME))?,
    };

    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
