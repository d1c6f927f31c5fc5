//! Change records flowing from change sources to the coordinator

use crate::key::SourceKey;
use crate::time::Timestamp;

/// One observed (or synthesized) change to a source file
///
/// Never mutated after creation. A deferred record is re-enqueued as-is,
/// keeping its original `observed_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Source file this change refers to
    pub key: SourceKey,
    /// When the change was observed
    pub observed_at: Timestamp,
}

impl ChangeRecord {
    pub fn new(key: SourceKey, observed_at: Timestamp) -> Self {
        Self { key, observed_at }
    }
}
