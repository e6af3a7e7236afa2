//! Chunk id generation and parsing.
//!
//! Ids use the wire format `fileKey:type:identifier`. The format is
//! user-visible and stable across versions; `identifier` is caller-supplied
//! or a 16-hex-character random token. There is no collision resistance
//! beyond the random token — callers choosing deterministic identifiers are
//! responsible for uniqueness.

use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;

use crate::error::ChunkError;
use crate::types::ChunkType;

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):([^:]+)(?::([^:]+))?$").expect("valid id pattern"));

/// Number of random bytes in a generated identifier (hex-encoded to 16 chars).
const RANDOM_IDENTIFIER_BYTES: usize = 8;

/// Components of a parsed chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChunkId {
    pub file_key: String,
    pub chunk_type: ChunkType,
    /// Absent when the id carries only `fileKey:type`.
    pub identifier: Option<String>,
}

/// Build a chunk id from its components.
///
/// When `identifier` is omitted a random 16-hex-character token is used.
/// Colons in a caller-supplied identifier (design node ids look like `1:2`)
/// are mapped to `-` to keep the three-segment wire format parseable; the
/// mapping is deterministic, so the id stays stable for a given triple.
#[must_use]
pub fn generate(file_key: &str, chunk_type: ChunkType, identifier: Option<&str>) -> String {
    match identifier {
        Some(ident) => {
            let ident = ident.replace(':', "-");
            format!("{file_key}:{}:{ident}", chunk_type.as_str())
        }
        None => {
            let mut bytes = [0u8; RANDOM_IDENTIFIER_BYTES];
            rand::thread_rng().fill_bytes(&mut bytes);
            format!("{file_key}:{}:{}", chunk_type.as_str(), hex::encode(bytes))
        }
    }
}

/// Parse a chunk id into its components.
///
/// # Errors
/// `ChunkError::InvalidInput` when the id does not match the wire format or
/// the type segment is not a recognized variant.
pub fn parse(id: &str) -> Result<ParsedChunkId, ChunkError> {
    let caps = ID_PATTERN
        .captures(id)
        .ok_or_else(|| ChunkError::InvalidInput(format!("malformed chunk id: {id}")))?;

    let file_key = caps[1].to_string();
    let chunk_type: ChunkType = caps[2].parse()?;
    let identifier = caps.get(3).map(|m| m.as_str().to_string());

    Ok(ParsedChunkId {
        file_key,
        chunk_type,
        identifier,
    })
}

/// Whether `id` would parse successfully.
#[must_use]
pub fn validate(id: &str) -> bool {
    parse(id).is_ok()
}
