//! Error types shared across crates

use crate::record::ChangeRecord;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The coordinator side of the event queue is gone
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("event queue is closed")]
    Closed,
}

/// Non-blocking enqueue failed; the record is handed back
#[derive(Debug, Error)]
pub enum TryEnqueueError {
    #[error("event queue is full")]
    Full(ChangeRecord),

    #[error("event queue is closed")]
    Closed(ChangeRecord),
}

impl TryEnqueueError {
    pub fn into_record(self) -> ChangeRecord {
        match self {
            Self::Full(record) | Self::Closed(record) => record,
        }
    }
}

/// One artifact that could not be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Failure reported by a render adapter for one generation attempt
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed map {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("unsupported map feature in {path}: {feature}")]
    Unsupported { path: PathBuf, feature: String },

    #[error("failed to load image {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("{} of {} artifacts could not be written (first: {})", .failures.len(), .failures.len() + .written.len(), first_failure(.failures))]
    Persist {
        written: Vec<PathBuf>,
        failures: Vec<ArtifactFailure>,
    },

    #[error("render adapter panicked: {0}")]
    Panicked(String),
}

fn first_failure(failures: &[ArtifactFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{}: {}", f.path.display(), f.message))
        .unwrap_or_default()
}
