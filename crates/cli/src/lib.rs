//! Library half of the mapwatch binary
//!
//! Exposes the pieces the commands are built from so integration tests can
//! drive them without spawning the binary.

pub mod logging;
pub mod pipeline;
pub mod settings;

pub use logging::{init_logging, level_for, LoggingGuard};
pub use pipeline::Pipeline;
pub use settings::{resolve, Overrides};
