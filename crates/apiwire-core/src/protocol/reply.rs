//! Typed results of reply sentences.
//!
//! The server never echoes which request a reply belongs to.  A [`Reply`] is
//! therefore just the content of one terminal sentence (or the aggregation of
//! several `!re` sentences); matching it to a request is the caller's job.

use std::collections::BTreeMap;
use std::fmt;

/// Key/value attributes carried by one sentence.
///
/// Key order carries no meaning on the wire, so a sorted map is used.  Only
/// the *order of maps* inside a [`Reply::DoneList`] is significant: it is the
/// order in which the `!re` sentences arrived.
pub type Attributes = BTreeMap<String, String>;

/// Attribute key holding the human-readable reason of a `!trap` or `!fatal`.
pub const MESSAGE_KEY: &str = "message";

/// A control word that classifies the sentence it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// `!done` – closes the request.
    Done,
    /// `!re` – one element of a result list; the request stays open.
    Re,
    /// `!trap` – closes the request with an error.
    Trap,
    /// `!fatal` – the server is closing the whole connection.
    Fatal,
    /// `!empty` – the result list is known to be empty; `!done` follows.
    Empty,
    /// Any other `!` word.  Recorded so it can be logged, otherwise inert.
    Other(String),
}

impl Marker {
    /// Classifies a word.  Returns `None` for words that do not start with `!`.
    pub fn parse(word: &str) -> Option<Self> {
        if !word.starts_with('!') {
            return None;
        }
        Some(match word {
            "!done" => Marker::Done,
            "!re" => Marker::Re,
            "!trap" => Marker::Trap,
            "!fatal" => Marker::Fatal,
            "!empty" => Marker::Empty,
            other => Marker::Other(other.to_string()),
        })
    }

    /// The literal word as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Marker::Done => "!done",
            Marker::Re => "!re",
            Marker::Trap => "!trap",
            Marker::Fatal => "!fatal",
            Marker::Empty => "!empty",
            Marker::Other(word) => word,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed reply to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `!done` with no preceding `!re`: the attributes of the closing sentence.
    Done(Attributes),
    /// One or more `!re` sentences followed by `!done`, in arrival order.
    DoneList(Vec<Attributes>),
    /// `!trap`: the request failed.  Attributes normally include `message`.
    Trap(Attributes),
}

/// The successful half of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A single attribute map (possibly empty).
    Map(Attributes),
    /// An aggregated `!re` result list.
    List(Vec<Attributes>),
}

impl Reply {
    /// Splits the reply into success or trap attributes.
    pub fn into_result(self) -> Result<Response, Attributes> {
        match self {
            Reply::Done(attributes) => Ok(Response::Map(attributes)),
            Reply::DoneList(items) => Ok(Response::List(items)),
            Reply::Trap(attributes) => Err(attributes),
        }
    }

    /// Returns `true` for `!trap` replies.
    pub fn is_trap(&self) -> bool {
        matches!(self, Reply::Trap(_))
    }
}

impl Response {
    /// Returns the single attribute map, or `None` for a list result.
    pub fn as_map(&self) -> Option<&Attributes> {
        match self {
            Response::Map(attributes) => Some(attributes),
            Response::List(_) => None,
        }
    }

    /// Converts the response into a list; a single map becomes a list of one
    /// unless it is empty.
    pub fn into_list(self) -> Vec<Attributes> {
        match self {
            Response::List(items) => items,
            Response::Map(attributes) if attributes.is_empty() => Vec::new(),
            Response::Map(attributes) => vec![attributes],
        }
    }
}
