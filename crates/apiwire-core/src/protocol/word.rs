//! Words and sentences on the wire.
//!
//! A request sentence is the command path followed by one attribute word per
//! parameter and a zero-length terminator:
//!
//! ```text
//! [len]/interface/print [len]=name=ether1 [len]?type=ether [0x00]
//! ```

use super::length::{decode_length, encode_length, ProtocolError};

/// Prefix of an ordinary parameter word (`=key=value`).
const PARAM_TAG: char = '=';
/// Prefix of a query parameter word (`?key=value`).
const QUERY_TAG: char = '?';

/// Encodes a single word: its length prefix followed by its bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedLength`] if the word is too long for
/// the length codec.
pub fn encode_word(word: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = encode_length(word.len())?;
    buf.extend_from_slice(word);
    Ok(buf)
}

/// Formats one request parameter as an attribute word.
///
/// Keys starting with `?` are query parameters and are sent verbatim as
/// `?key=value`; every other key gets the `=` tag.
pub fn parameter_word(key: &str, value: &str) -> String {
    if key.starts_with(QUERY_TAG) {
        format!("{key}={value}")
    } else {
        format!("{PARAM_TAG}{key}={value}")
    }
}

/// Encodes a complete request sentence, terminator included.
///
/// Parameters are written in iteration order.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedLength`] if any word is too long.
///
/// # Examples
///
/// ```rust
/// use apiwire_core::protocol::word::encode_sentence;
///
/// let bytes = encode_sentence("/login", [("name", "admin")]).unwrap();
/// assert_eq!(bytes[0], 6);
/// assert_eq!(&bytes[1..7], b"/login");
/// assert_eq!(*bytes.last().unwrap(), 0);
/// ```
pub fn encode_sentence<I, K, V>(command: &str, params: I) -> Result<Vec<u8>, ProtocolError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut buf = encode_word(command.as_bytes())?;
    for (key, value) in params {
        let word = parameter_word(key.as_ref(), value.as_ref());
        buf.extend_from_slice(&encode_word(word.as_bytes())?);
    }
    buf.push(0x00);
    Ok(buf)
}

/// Decodes one word from the start of `bytes`.
///
/// Returns the payload slice and the total bytes consumed (prefix + payload).
///
/// # Errors
///
/// [`ProtocolError::InsufficientData`] if the prefix or the payload is not
/// complete yet; [`ProtocolError::InvalidLengthPrefix`] for a corrupt prefix.
pub fn decode_word(bytes: &[u8]) -> Result<(&[u8], usize), ProtocolError> {
    let (prefix, length) = decode_length(bytes)?;
    let total = prefix + length;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }
    Ok((&bytes[prefix..total], total))
}

/// Decodes one whole sentence of raw words from the start of `bytes`.
///
/// The terminator is consumed but not returned.  Useful for diagnostics and
/// for test servers that need to read request sentences.
///
/// # Errors
///
/// [`ProtocolError::InsufficientData`] until the terminator has arrived.
pub fn decode_sentence(bytes: &[u8]) -> Result<(Vec<String>, usize), ProtocolError> {
    let mut words = Vec::new();
    let mut offset = 0;
    loop {
        let (word, consumed) = decode_word(&bytes[offset..]).map_err(|e| match e {
            ProtocolError::InsufficientData { needed, .. } => ProtocolError::InsufficientData {
                needed: offset + needed,
                available: bytes.len(),
            },
            other => other,
        })?;
        offset += consumed;
        if word.is_empty() {
            return Ok((words, offset));
        }
        words.push(String::from_utf8_lossy(word).into_owned());
    }
}

/// Splits an attribute word into its key and value.
///
/// `=key=value` and `?key=value` lose their tag; anything else (for example
/// `.tag=7`) is split on its first `=`.  The value keeps any further `=`
/// characters, and a word without `=` yields an empty value.
pub fn split_attribute(word: &str) -> (String, String) {
    let body = word
        .strip_prefix(PARAM_TAG)
        .or_else(|| word.strip_prefix(QUERY_TAG))
        .unwrap_or(word);
    match body.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (body.to_string(), String::new()),
    }
}
