//! Streaming parser that reassembles replies from arbitrarily chunked bytes.
//!
//! # Why a buffer is needed
//!
//! A socket read may return half a word, or the tail of one sentence plus
//! the start of the next.  [`SentenceParser::push`] appends every chunk to an
//! internal buffer and consumes complete words only; a partial word stays in
//! the buffer untouched until the next chunk arrives.  The reply produced for
//! a given byte stream is the same no matter where it was split.
//!
//! # Reduction rules
//!
//! ```text
//! !re    attrs  0x00   push attrs onto the result list, keep waiting
//! !empty        0x00   start an (empty) result list, keep waiting
//! !done  attrs  0x00   Reply::DoneList(list) if a list exists, else Reply::Done(attrs)
//! !trap  attrs  0x00   Reply::Trap(attrs), any partial list is dropped
//! !fatal msg           ParseEvent::Fatal(msg); the parser stops for good
//! ```
//!
//! A zero-length word with no marker and no attributes is an empty sentence
//! and produces nothing.

use tracing::{debug, warn};

use super::length::ProtocolError;
use super::reply::{Attributes, Marker, Reply};
use super::word::{decode_word, split_attribute};

/// Something the parser finished while consuming a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A terminal reply for the oldest outstanding request.
    Reply(Reply),
    /// The server sent `!fatal`; the connection is going away.
    Fatal(String),
}

/// Incremental sentence parser.
///
/// One parser belongs to one connection.  All in-progress state lives in
/// the struct, so independent connections never share anything.
#[derive(Debug, Default)]
pub struct SentenceParser {
    /// Bytes received but not yet consumed as complete words.
    buffer: Vec<u8>,
    /// Marker of the sentence currently being read.
    marker: Option<Marker>,
    /// Attributes of the sentence currently being read.
    attributes: Attributes,
    /// Result list, present once `!re` or `!empty` has closed a sentence.
    list: Option<Vec<Attributes>>,
    /// `!fatal` was read; the next word is its message.
    awaiting_fatal_message: bool,
    /// `!fatal` has been fully handled; further input is ignored.
    halted: bool,
}

impl SentenceParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every event it completed, in wire order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidLengthPrefix`] if the stream is
    /// corrupt.  The connection cannot be resynchronised after that.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ParseEvent>, ProtocolError> {
        let mut events = Vec::new();
        if self.halted {
            return Ok(events);
        }
        self.buffer.extend_from_slice(chunk);

        let mut offset = 0;
        loop {
            let decoded = decode_word(&self.buffer[offset..])
                .map(|(word, consumed)| (String::from_utf8_lossy(word).into_owned(), consumed));
            let word = match decoded {
                Ok((word, consumed)) => {
                    offset += consumed;
                    word
                }
                Err(ProtocolError::InsufficientData { .. }) => break,
                Err(e) => {
                    self.buffer.drain(..offset);
                    return Err(e);
                }
            };

            if self.awaiting_fatal_message {
                warn!("server sent !fatal: {word}");
                self.halt();
                events.push(ParseEvent::Fatal(word));
                return Ok(events);
            }

            if word.is_empty() {
                if let Some(reply) = self.finish_sentence() {
                    events.push(ParseEvent::Reply(reply));
                }
                continue;
            }

            match Marker::parse(&word) {
                Some(Marker::Fatal) => self.awaiting_fatal_message = true,
                Some(marker) => self.marker = Some(marker),
                None => {
                    let (key, value) = split_attribute(&word);
                    self.attributes.insert(key, value);
                }
            }
        }

        self.buffer.drain(..offset);
        Ok(events)
    }

    /// Returns `true` once a `!fatal` has been parsed.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of received bytes still waiting to form a complete word.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn halt(&mut self) {
        self.halted = true;
        self.awaiting_fatal_message = false;
        self.buffer.clear();
        self.marker = None;
        self.attributes.clear();
        self.list = None;
    }

    /// Applies the reduction rules to the sentence that just ended.
    fn finish_sentence(&mut self) -> Option<Reply> {
        let marker = self.marker.take();
        let attributes = std::mem::take(&mut self.attributes);
        match marker {
            Some(Marker::Re) => {
                self.list.get_or_insert_with(Vec::new).push(attributes);
                None
            }
            Some(Marker::Empty) => {
                self.list.get_or_insert_with(Vec::new);
                None
            }
            Some(Marker::Trap) => {
                self.list = None;
                Some(Reply::Trap(attributes))
            }
            Some(Marker::Done) => Some(self.close_with(attributes)),
            None if attributes.is_empty() => None,
            None => Some(self.close_with(attributes)),
            Some(other) => {
                debug!("ignoring sentence with unrecognised marker {other}");
                None
            }
        }
    }

    fn close_with(&mut self, attributes: Attributes) -> Reply {
        match self.list.take() {
            Some(items) => Reply::DoneList(items),
            None => Reply::Done(attributes),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::word::encode_word;

    /// Builds a reply stream from sentences of words.
    fn stream(sentences: &[&[&str]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for sentence in sentences {
            for word in *sentence {
                buf.extend_from_slice(&encode_word(word.as_bytes()).unwrap());
            }
            buf.push(0);
        }
        buf
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_done_without_attributes_yields_empty_map() {
        // Arrange
        let mut parser = SentenceParser::new();

        // Act
        let events = parser.push(&stream(&[&["!done"]])).unwrap();

        // Assert
        assert_eq!(events, vec![ParseEvent::Reply(Reply::Done(Attributes::new()))]);
    }

    #[test]
    fn test_done_with_attributes_yields_map() {
        let mut parser = SentenceParser::new();
        let events = parser
            .push(&stream(&[&["!done", "=ret=0123abcd"]]))
            .unwrap();
        assert_eq!(
            events,
            vec![ParseEvent::Reply(Reply::Done(attrs(&[("ret", "0123abcd")])))]
        );
    }

    #[test]
    fn test_re_sentences_aggregate_into_list_in_order() {
        // Arrange
        let mut parser = SentenceParser::new();
        let bytes = stream(&[
            &["!re", "=name=ether1"],
            &["!re", "=name=ether2"],
            &["!done"],
        ]);

        // Act
        let events = parser.push(&bytes).unwrap();

        // Assert
        assert_eq!(
            events,
            vec![ParseEvent::Reply(Reply::DoneList(vec![
                attrs(&[("name", "ether1")]),
                attrs(&[("name", "ether2")]),
            ]))]
        );
    }

    #[test]
    fn test_re_items_do_not_complete_until_done() {
        let mut parser = SentenceParser::new();
        let events = parser.push(&stream(&[&["!re", "=a=1"]])).unwrap();
        assert!(events.is_empty(), "a !re alone keeps the request open");

        let events = parser.push(&stream(&[&["!done"]])).unwrap();
        assert_eq!(
            events,
            vec![ParseEvent::Reply(Reply::DoneList(vec![attrs(&[("a", "1")])]))]
        );
    }

    #[test]
    fn test_empty_marker_then_done_yields_empty_list() {
        let mut parser = SentenceParser::new();
        let events = parser.push(&stream(&[&["!empty"], &["!done"]])).unwrap();
        assert_eq!(events, vec![ParseEvent::Reply(Reply::DoneList(Vec::new()))]);
    }

    #[test]
    fn test_trap_yields_trap_with_message() {
        // Arrange: trap sentence followed by a stray empty sentence
        let mut bytes = stream(&[&["!trap", "=message=bad command"]]);
        bytes.push(0);
        let mut parser = SentenceParser::new();

        // Act
        let events = parser.push(&bytes).unwrap();

        // Assert: exactly one reply, the empty sentence is ignored
        assert_eq!(
            events,
            vec![ParseEvent::Reply(Reply::Trap(attrs(&[(
                "message",
                "bad command"
            )])))]
        );
    }

    #[test]
    fn test_trap_after_re_discards_partial_list() {
        let mut parser = SentenceParser::new();
        let bytes = stream(&[
            &["!re", "=a=1"],
            &["!trap", "=message=interrupted"],
            &["!done"],
        ]);
        let events = parser.push(&bytes).unwrap();
        assert_eq!(
            events,
            vec![
                ParseEvent::Reply(Reply::Trap(attrs(&[("message", "interrupted")]))),
                ParseEvent::Reply(Reply::Done(Attributes::new())),
            ]
        );
    }

    #[test]
    fn test_two_replies_in_one_chunk_are_both_emitted() {
        let mut parser = SentenceParser::new();
        let bytes = stream(&[&["!done", "=x=1"], &["!done", "=x=2"]]);
        let events = parser.push(&bytes).unwrap();
        assert_eq!(
            events,
            vec![
                ParseEvent::Reply(Reply::Done(attrs(&[("x", "1")]))),
                ParseEvent::Reply(Reply::Done(attrs(&[("x", "2")]))),
            ]
        );
    }

    #[test]
    fn test_one_byte_chunks_match_single_chunk() {
        // Arrange
        let bytes = stream(&[
            &["!re", "=name=ether1", "=mtu=1500"],
            &["!re", "=name=bridge"],
            &["!done"],
        ]);
        let whole = SentenceParser::new().push(&bytes).unwrap();

        // Act
        let mut parser = SentenceParser::new();
        let mut pieces = Vec::new();
        for byte in &bytes {
            pieces.extend(parser.push(std::slice::from_ref(byte)).unwrap());
        }

        // Assert
        assert_eq!(pieces, whole);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_partial_word_is_retained_between_chunks() {
        let bytes = stream(&[&["!done", "=comment=hello"]]);
        let mut parser = SentenceParser::new();

        let events = parser.push(&bytes[..5]).unwrap();
        assert!(events.is_empty());
        assert!(parser.buffered_len() > 0);

        let events = parser.push(&bytes[5..]).unwrap();
        assert_eq!(
            events,
            vec![ParseEvent::Reply(Reply::Done(attrs(&[("comment", "hello")])))]
        );
    }

    #[test]
    fn test_fatal_emits_message_and_halts() {
        // Arrange
        let mut parser = SentenceParser::new();
        let bytes = stream(&[&["!fatal", "connection terminated"], &["!done"]]);

        // Act
        let events = parser.push(&bytes).unwrap();

        // Assert: nothing after the fatal message is processed
        assert_eq!(
            events,
            vec![ParseEvent::Fatal("connection terminated".to_string())]
        );
        assert!(parser.is_halted());
        assert!(parser.push(&stream(&[&["!done"]])).unwrap().is_empty());
    }

    #[test]
    fn test_fatal_message_split_across_chunks() {
        let bytes = stream(&[&["!fatal", "session closed"]]);
        let mut parser = SentenceParser::new();

        // Cut inside the message word
        let events = parser.push(&bytes[..10]).unwrap();
        assert!(events.is_empty());
        assert!(!parser.is_halted());

        let events = parser.push(&bytes[10..]).unwrap();
        assert_eq!(events, vec![ParseEvent::Fatal("session closed".to_string())]);
    }

    #[test]
    fn test_invalid_prefix_is_an_error() {
        let mut parser = SentenceParser::new();
        let result = parser.push(&[0xF8, 0, 0, 0, 0]);
        assert_eq!(result, Err(ProtocolError::InvalidLengthPrefix(0xF8)));
    }

    #[test]
    fn test_unknown_marker_sentence_is_ignored() {
        let mut parser = SentenceParser::new();
        let bytes = stream(&[&["!weird", "=a=1"], &["!done"]]);
        let events = parser.push(&bytes).unwrap();
        assert_eq!(events, vec![ParseEvent::Reply(Reply::Done(Attributes::new()))]);
    }
}
