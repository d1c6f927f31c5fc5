//! Generation coordinator for mapwatch
//!
//! This crate provides:
//! - The per-key generation store (busy flag + last generation stamp)
//! - The coordinator deciding generate / stale / defer for each record
//! - The single-consumer loop that drives it from the event queue

pub mod coordinator;
pub mod deferred;
pub mod stats;
pub mod store;

// Re-exports
pub use coordinator::{Coordinator, Disposition};
pub use deferred::DeferredSet;
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use store::{BusyGuard, GenerationStore, Stamp};
