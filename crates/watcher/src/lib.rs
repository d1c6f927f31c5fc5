//! Change sources for mapwatch
//!
//! This crate provides:
//! - The event filter (source extension + ignore rules)
//! - The startup scan of the source directory
//! - The continuous filesystem watch
//!
//! Both change sources feed the same bounded event queue through the filter.

pub mod filter;
pub mod ignore;
pub mod scan;
pub mod watch;

pub use filter::EventFilter;
pub use self::ignore::IgnoreRules;
pub use scan::{InitialScan, ScanSummary};
pub use watch::{is_content_change, SourceWatcher};
