//! Core types shared by every mapwatch crate
//!
//! This crate provides:
//! - Timestamps and clocks used to order change records
//! - Source keys (canonical source paths) and change records
//! - The bounded event queue between change sources and the coordinator
//! - Watch configuration
//! - The render adapter boundary

pub mod adapter;
pub mod config;
pub mod error;
pub mod key;
pub mod queue;
pub mod record;
pub mod time;

// Re-exports
pub use adapter::{GenerationReport, RenderAdapter};
pub use config::{DeferPolicy, OutputMode, WatchConfig};
pub use error::{ArtifactFailure, ConfigError, QueueError, RenderError, TryEnqueueError};
pub use key::SourceKey;
pub use queue::{event_queue, QueueReceiver, QueueSender, DEFAULT_QUEUE_CAPACITY};
pub use record::ChangeRecord;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
