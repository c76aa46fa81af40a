//! Variable-length size prefix placed in front of every word.
//!
//! Wire format:
//! ```text
//! length < 0x80        [0xxxxxxx]
//! length < 0x4000      [10xxxxxx][xxxxxxxx]
//! length < 0x200000    [110xxxxx][xxxxxxxx][xxxxxxxx]
//! length < 0x10000000  [1110xxxx][xxxxxxxx][xxxxxxxx][xxxxxxxx]
//! otherwise            [11110000][xxxxxxxx][xxxxxxxx][xxxxxxxx][xxxxxxxx]
//! ```
//! The class marker lives in the high bits of the first byte; the length
//! bits that follow are big-endian.  Leading bytes `0xF8..=0xFF` are never
//! produced by an encoder and are rejected on decode.

use thiserror::Error;

/// Largest length representable by the two-byte class (exclusive).
const TWO_BYTE_LIMIT: usize = 0x4000;
/// Largest length representable by the three-byte class (exclusive).
const THREE_BYTE_LIMIT: usize = 0x20_0000;
/// Largest length representable by the four-byte class (exclusive).
const FOUR_BYTE_LIMIT: usize = 0x1000_0000;

/// Errors that can occur while encoding or decoding words.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer ends before the prefix (or the word it announces) is
    /// complete.  Streaming callers treat this as "wait for the next chunk".
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The first byte of a length prefix does not belong to any size class.
    #[error("invalid length prefix byte: 0x{0:02X}")]
    InvalidLengthPrefix(u8),

    /// The word is longer than the five-byte class can describe.
    #[error("word length {0} exceeds the largest encodable length")]
    UnsupportedLength(usize),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `length` as a 1 to 5 byte prefix.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedLength`] if `length` does not fit in
/// 32 bits.
///
/// # Examples
///
/// ```rust
/// use apiwire_core::protocol::length::{decode_length, encode_length};
///
/// let prefix = encode_length(300).unwrap();
/// assert_eq!(prefix, vec![0x81, 0x2C]);
/// assert_eq!(decode_length(&prefix).unwrap(), (2, 300));
/// ```
pub fn encode_length(length: usize) -> Result<Vec<u8>, ProtocolError> {
    let encoded = if length < 0x80 {
        vec![length as u8]
    } else if length < TWO_BYTE_LIMIT {
        let tagged = (length as u16) | 0x8000;
        tagged.to_be_bytes().to_vec()
    } else if length < THREE_BYTE_LIMIT {
        let tagged = (length as u32) | 0x00C0_0000;
        tagged.to_be_bytes()[1..].to_vec()
    } else if length < FOUR_BYTE_LIMIT {
        let tagged = (length as u32) | 0xE000_0000;
        tagged.to_be_bytes().to_vec()
    } else {
        let raw = u32::try_from(length).map_err(|_| ProtocolError::UnsupportedLength(length))?;
        let mut buf = Vec::with_capacity(5);
        buf.push(0xF0);
        buf.extend_from_slice(&raw.to_be_bytes());
        buf
    };
    Ok(encoded)
}

/// Decodes one length prefix from the beginning of `bytes`.
///
/// Returns `(bytes_consumed, length)` so the caller can advance past the
/// prefix.  Nothing is consumed on error.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] when the prefix is cut short; this
///   is the normal outcome while a stream is still arriving.
/// - [`ProtocolError::InvalidLengthPrefix`] when the first byte is
///   `0xF8..=0xFF`.
pub fn decode_length(bytes: &[u8]) -> Result<(usize, usize), ProtocolError> {
    let Some(&first) = bytes.first() else {
        return Err(ProtocolError::InsufficientData {
            needed: 1,
            available: 0,
        });
    };

    let (size, initial) = if first & 0x80 == 0x00 {
        return Ok((1, first as usize));
    } else if first & 0xC0 == 0x80 {
        (2, (first & 0x3F) as usize)
    } else if first & 0xE0 == 0xC0 {
        (3, (first & 0x1F) as usize)
    } else if first & 0xF0 == 0xE0 {
        (4, (first & 0x0F) as usize)
    } else if first & 0xF8 == 0xF0 {
        // The five-byte class carries no length bits in its first byte.
        (5, 0)
    } else {
        return Err(ProtocolError::InvalidLengthPrefix(first));
    };

    if bytes.len() < size {
        return Err(ProtocolError::InsufficientData {
            needed: size,
            available: bytes.len(),
        });
    }

    let length = bytes[1..size]
        .iter()
        .fold(initial, |acc, &b| (acc << 8) | b as usize);
    Ok((size, length))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
