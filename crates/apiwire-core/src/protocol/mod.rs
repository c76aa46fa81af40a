//! Protocol module containing the length codec, word encoding, reply types,
//! and the streaming sentence parser.

pub mod length;
pub mod parser;
pub mod reply;
pub mod word;

pub use length::{decode_length, encode_length, ProtocolError};
pub use parser::{ParseEvent, SentenceParser};
pub use reply::{Attributes, Marker, Reply, Response};
pub use word::{decode_sentence, encode_sentence, encode_word};
