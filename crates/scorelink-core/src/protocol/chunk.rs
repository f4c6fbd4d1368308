//! Binary chunk header carried at the start of the first frame of each file.
//!
//! Wire format:
//! ```text
//! [header:1024][payload:N]     first frame of a file (offset-0 request)
//! [payload:N]                  every later frame
//! ```
//! The header region is exactly [`CHUNK_HEADER_LEN`] bytes: the UTF-8 text
//! `{filename},{declaredLength}` terminated by a null byte, with the rest of
//! the region as padding. Payload bytes begin immediately after the region.

use thiserror::Error;

/// Fixed size of the header region at the start of a file's first frame.
pub const CHUNK_HEADER_LEN: usize = 1024;

/// Maximum number of payload bytes requested per chunk round trip.
pub const MAX_CHUNK_SIZE: u32 = 262_144;

/// Errors produced while parsing a chunk header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkHeaderError {
    /// Fewer than [`CHUNK_HEADER_LEN`] bytes were available.
    #[error("chunk header truncated: need {CHUNK_HEADER_LEN} bytes, got {0}")]
    Truncated(usize),

    /// No null terminator inside the header region.
    #[error("chunk header missing null terminator")]
    Unterminated,

    /// The header text is not `{filename},{declaredLength}`.
    #[error("malformed chunk header: {0}")]
    Malformed(String),
}

/// The parsed header of a file's first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Name the server declares for the file being sent.
    pub file_name: String,
    /// Total byte length the server declares for the file.
    pub declared_len: u64,
}

/// Parses the fixed header region at the start of `frame`.
///
/// # Errors
///
/// Returns [`ChunkHeaderError`] when the region is truncated, unterminated,
/// or its text does not parse.
pub fn parse_chunk_header(frame: &[u8]) -> Result<ChunkHeader, ChunkHeaderError> {
    if frame.len() < CHUNK_HEADER_LEN {
        return Err(ChunkHeaderError::Truncated(frame.len()));
    }
    let region = &frame[..CHUNK_HEADER_LEN];
    let end = region
        .iter()
        .position(|&b| b == 0)
        .ok_or(ChunkHeaderError::Unterminated)?;
    let text = std::str::from_utf8(&region[..end])
        .map_err(|e| ChunkHeaderError::Malformed(format!("invalid UTF-8: {e}")))?;

    let (name, len) = text
        .split_once(',')
        .ok_or_else(|| ChunkHeaderError::Malformed(format!("no comma in {text:?}")))?;
    if name.is_empty() {
        return Err(ChunkHeaderError::Malformed("empty file name".to_string()));
    }
    let declared_len = len
        .trim()
        .parse::<u64>()
        .map_err(|e| ChunkHeaderError::Malformed(format!("bad length {len:?}: {e}")))?;

    Ok(ChunkHeader {
        file_name: name.to_string(),
        declared_len,
    })
}

/// Builds a header region for `file_name`/`declared_len`.
///
/// The inverse of [`parse_chunk_header`]; servers and test fixtures use it to
/// produce the first frame of a file.
pub fn encode_chunk_header(file_name: &str, declared_len: u64) -> [u8; CHUNK_HEADER_LEN] {
    let mut region = [0u8; CHUNK_HEADER_LEN];
    let text = format!("{file_name},{declared_len}");
    let bytes = text.as_bytes();
    // Truncation would corrupt the name; real file names are far below 1023
    // bytes, the cap exists to keep the copy in bounds.
    let n = bytes.len().min(CHUNK_HEADER_LEN - 1);
    region[..n].copy_from_slice(&bytes[..n]);
    region
}

// ── Tests ─────────────────────────────────────────────────────────────────────
