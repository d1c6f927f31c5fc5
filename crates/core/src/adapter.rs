//! Boundary between the coordinator and whatever produces artifacts

use crate::error::RenderError;
use crate::key::SourceKey;
use std::path::PathBuf;

/// Produces the derived artifacts for one source file
///
/// Called by the coordinator once per accepted generation, synchronously on
/// the coordinator thread. Implementations perform no retries of their own.
pub trait RenderAdapter: Send + Sync {
    fn generate(&self, key: &SourceKey) -> Result<GenerationReport, RenderError>;
}

/// Outcome of a successful generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Artifacts written, in the order they were produced
    pub artifacts: Vec<PathBuf>,
}

impl GenerationReport {
    pub fn new(artifacts: Vec<PathBuf>) -> Self {
        Self { artifacts }
    }
}
