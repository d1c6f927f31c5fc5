//! Tiled map rendering for mapwatch
//!
//! This crate provides:
//! - TMX/TSX parsing into a small map model
//! - Tile data decoding (XML, CSV, base64 with zlib/gzip/zstd)
//! - Layer drawing with flips, offsets, opacity and the upper/lower split
//! - PNG output with atomic replacement
//! - `TiledRenderer`, the render adapter the coordinator calls

pub mod canvas;
pub mod data;
pub mod output;
pub mod renderer;
pub mod tileset;
pub mod tmx;
pub mod xml;

// Re-exports
pub use canvas::{Canvas, Placement, Stratum};
pub use renderer::{TiledRenderer, SPLIT_HEIGHT_PROPERTY};
pub use tmx::Map;
