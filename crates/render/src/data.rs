//! Tile layer `<data>` decoding
//!
//! Supports XML `<tile>` children, CSV, and base64 with optional zlib, gzip
//! or zstd compression. Output is the raw global tile IDs (flip flags
//! included), row-major.

use crate::xml::Element;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;
use thiserror::Error;

/// Standard alphabet; Tiled pads, but unpadded input is accepted too
const TILE_DATA_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("unknown tile data encoding '{0}'")]
    UnknownEncoding(String),

    #[error("unknown tile data compression '{0}'")]
    UnknownCompression(String),

    #[error("compression requires base64 encoding")]
    CompressionWithoutBase64,

    #[error("invalid CSV tile id '{0}'")]
    Csv(String),

    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("decompressed tile data exceeds {limit} bytes")]
    Oversized { limit: usize },

    #[error("decoded {actual} bytes, not a whole number of tile ids")]
    Truncated { actual: usize },

    #[error("expected {expected} tiles, found {actual}")]
    Count { expected: usize, actual: usize },
}

/// Decode a `<data>` element holding `expected` tiles
pub fn decode_tile_data(data: &Element, expected: usize) -> Result<Vec<u32>, DataError> {
    if data.child("chunk").is_some() {
        // Chunks only appear in infinite maps, which are rejected earlier
        return Err(DataError::UnknownEncoding("chunk".to_string()));
    }

    let gids = match (data.attr("encoding"), data.attr("compression")) {
        (None, None) => data
            .children_named("tile")
            .map(|tile| match tile.attr("gid") {
                Some(gid) => gid.parse().map_err(|_| DataError::Csv(gid.to_string())),
                None => Ok(0),
            })
            .collect::<Result<Vec<u32>, _>>()?,
        (Some("csv"), None) => parse_csv(&data.text)?,
        (Some("base64"), compression) => {
            let raw = decode_base64(&data.text)?;
            let bytes = decompress(raw, compression, expected.saturating_mul(4))?;
            gids_from_le_bytes(&bytes)?
        }
        (Some("csv"), Some(_)) | (None, Some(_)) => return Err(DataError::CompressionWithoutBase64),
        (Some(other), _) => return Err(DataError::UnknownEncoding(other.to_string())),
    };

    if gids.len() != expected {
        return Err(DataError::Count {
            expected,
            actual: gids.len(),
        });
    }
    Ok(gids)
}

fn parse_csv(text: &str) -> Result<Vec<u32>, DataError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| DataError::Csv(s.to_string())))
        .collect()
}

/// Inflate `raw`, reading at most one byte past `limit`
fn decompress(raw: Vec<u8>, compression: Option<&str>, limit: usize) -> Result<Vec<u8>, DataError> {
    let failed = |e: std::io::Error| DataError::Decompress(e.to_string());
    let reader: Box<dyn Read + '_> = match compression {
        None | Some("") => return Ok(raw),
        Some("zlib") => Box::new(ZlibDecoder::new(raw.as_slice())),
        Some("gzip") => Box::new(GzDecoder::new(raw.as_slice())),
        Some("zstd") => Box::new(zstd::stream::read::Decoder::new(raw.as_slice()).map_err(failed)?),
        Some(other) => return Err(DataError::UnknownCompression(other.to_string())),
    };

    let mut out = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(failed)?;
    if out.len() > limit {
        return Err(DataError::Oversized { limit });
    }
    Ok(out)
}

fn gids_from_le_bytes(bytes: &[u8]) -> Result<Vec<u32>, DataError> {
    if bytes.len() % 4 != 0 {
        return Err(DataError::Truncated {
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Base64 payload with the surrounding and embedded whitespace removed
fn decode_base64(text: &str) -> Result<Vec<u8>, DataError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    TILE_DATA_BASE64
        .decode(compact)
        .map_err(|e| DataError::Base64(e.to_string()))
}
