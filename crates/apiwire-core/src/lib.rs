//! # apiwire-core
//!
//! Shared library for the device administration API containing the
//! variable-length word codec and the streaming sentence parser.
//!
//! This crate is pure: it never touches sockets, timers, or async runtimes.
//! The `apiwire-client` crate feeds it bytes and acts on what it returns.
//!
//! # Architecture overview (for beginners)
//!
//! The API speaks in *sentences*.  A sentence is a list of *words*, and every
//! word travels on the wire as a length prefix followed by that many bytes.
//! A zero-length word ends the sentence.
//!
//! - **`protocol::length`** – The 1 to 5 byte length prefix.
//! - **`protocol::word`** – Building request sentences from a command and its
//!   parameters, and splitting raw sentences back into words.
//! - **`protocol::reply`** – The typed result of a reply sentence
//!   (`!done`, `!re`, `!trap`).
//! - **`protocol::parser`** – The stateful parser that turns an arbitrarily
//!   chunked byte stream into complete replies.

pub mod protocol;

pub use protocol::length::{decode_length, encode_length, ProtocolError};
pub use protocol::parser::{ParseEvent, SentenceParser};
pub use protocol::reply::{Attributes, Marker, Reply, Response};
pub use protocol::word::{decode_sentence, encode_sentence, encode_word};
