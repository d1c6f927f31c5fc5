//! Watch configuration
//!
//! Loaded from `mapwatch.toml` (all keys optional), then overridden by
//! command-line flags, then validated.

use crate::error::ConfigError;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "mapwatch.toml";

const MAX_QUEUE_CAPACITY: usize = 100_000;
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory holding the source maps
    pub source_dir: PathBuf,

    /// Directory receiving generated images
    pub dest_dir: PathBuf,

    /// Source file extension, without the dot (matched case-insensitively)
    pub extension: String,

    /// Watch and scan subdirectories too
    pub recursive: bool,

    /// Write one image per top-level group instead of one merged image
    pub separate_groups: bool,

    /// Capacity of the event queue
    pub queue_capacity: usize,

    /// Delay before a deferred record is re-enqueued (0 = immediately)
    pub retry_backoff_ms: u64,

    /// Honor a `.mapignore` file in the source directory
    pub use_ignore_file: bool,

    /// Extra gitignore-style patterns for source paths to skip
    pub ignore_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./maps"),
            dest_dir: PathBuf::from("./img/tilesets"),
            extension: "tmx".to_string(),
            recursive: false,
            separate_groups: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_backoff_ms: 0,
            use_ignore_file: true,
            ignore_patterns: vec![],
        }
    }
}

impl WatchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(ConfigError::Invalid("extension must not be empty".to_string()));
        }
        if extension.contains(|c: char| c == '/' || c == '\\') {
            return Err(ConfigError::Invalid(format!(
                "extension must not contain path separators: {}",
                self.extension
            )));
        }

        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "queue_capacity must be between 1 and {}, got {}",
                MAX_QUEUE_CAPACITY, self.queue_capacity
            )));
        }

        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "retry_backoff_ms must be at most {}, got {}",
                MAX_RETRY_BACKOFF_MS, self.retry_backoff_ms
            )));
        }

        if self.source_dir == self.dest_dir {
            return Err(ConfigError::Invalid(format!(
                "source_dir and dest_dir must differ ({})",
                self.source_dir.display()
            )));
        }

        Ok(())
    }

    /// Extension normalized to lowercase without a leading dot
    pub fn normalized_extension(&self) -> String {
        self.extension.trim_start_matches('.').to_ascii_lowercase()
    }

    pub fn output_mode(&self) -> OutputMode {
        if self.separate_groups {
            OutputMode::SeparateGroups
        } else {
            OutputMode::Merged
        }
    }

    pub fn defer_policy(&self) -> DeferPolicy {
        match self.retry_backoff_ms {
            0 => DeferPolicy::Immediate,
            ms => DeferPolicy::Backoff(Duration::from_millis(ms)),
        }
    }

    /// Annotated example configuration file
    pub fn example() -> &'static str {
        EXAMPLE_CONFIG
    }
}

/// Which artifacts a generation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One image per source containing every visible layer
    Merged,
    /// One or more images per top-level group (split further by the
    /// group's `splitHeight` property)
    SeparateGroups,
}

/// What the coordinator does with a record whose key is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferPolicy {
    /// Append to the queue tail right away. A key that stays busy makes the
    /// loop cycle the same record repeatedly.
    Immediate,
    /// Hold the record aside for the given delay, then append it
    Backoff(Duration),
}

const EXAMPLE_CONFIG: &str = r#"# mapwatch configuration
#
# Every key is optional; command-line flags override these values.

# Directory holding the .tmx source maps
source_dir = "./maps"

# Directory receiving generated PNG files
dest_dir = "./img/tilesets"

# Source file extension (case-insensitive)
extension = "tmx"

# Also scan and watch subdirectories
recursive = false

# One image per top-level group instead of one merged image.
# Groups with the boolean property `splitHeight = true` are further split
# into a tile-layer image and upper/lower images per object group.
separate_groups = false

# Records buffered between the watcher and the generator (1-100000)
queue_capacity = 100

# Delay before retrying a change whose map is still being generated
# (milliseconds, 0 = retry immediately)
retry_backoff_ms = 0

# Honor a .mapignore file (gitignore syntax) in source_dir
use_ignore_file = true

# Extra gitignore-style patterns to skip
ignore_patterns = []
"#;
