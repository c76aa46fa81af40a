//! Error taxonomy surfaced by a session.

use std::io;

use apiwire_core::protocol::reply::MESSAGE_KEY;
use apiwire_core::{Attributes, ProtocolError};
use thiserror::Error;

use crate::domain::{ConnectionState, DisconnectReason};

/// Errors returned by `connect()` and `exec()`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The inactivity watchdog fired before the server answered.
    #[error("connection timeout")]
    ConnectionTimeout,

    /// The socket failed, hit EOF, or the session was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server sent `!fatal`.  Every queued request sees this.
    #[error("!fatal {0}")]
    ProtocolFatal(String),

    /// The server answered this request with `!trap`.
    #[error("{message}")]
    Command {
        /// The trap's `message` attribute (empty if the server sent none).
        message: String,
        /// All attributes of the trap sentence.
        attributes: Attributes,
    },

    /// A word could not be encoded, or the reply stream was corrupt.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The TCP connection could not be opened.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TLS options were unusable or the TLS handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// `exec()` was called without a live connection.
    #[error("session is not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    /// `connect()` was called on a session that is already live.
    #[error("session is already {state}")]
    AlreadyConnected { state: ConnectionState },

    /// The login exchange returned something unusable.
    #[error("authentication failed: {0}")]
    Authentication(String),
}

impl ClientError {
    /// Builds the error for a `!trap` reply.
    pub fn from_trap(attributes: Attributes) -> Self {
        let message = attributes.get(MESSAGE_KEY).cloned().unwrap_or_default();
        Self::Command {
            message,
            attributes,
        }
    }

    /// The error every queued request receives when a connection goes away.
    pub fn from_disconnect(reason: &DisconnectReason) -> Self {
        match reason {
            DisconnectReason::Timeout => Self::ConnectionTimeout,
            DisconnectReason::Closed => Self::ConnectionClosed,
            DisconnectReason::Fatal(message) => Self::ProtocolFatal(message.clone()),
            DisconnectReason::Protocol(e) => Self::Protocol(e.clone()),
        }
    }

    /// `true` for errors that end the connection rather than one request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout | Self::ConnectionClosed | Self::ProtocolFatal(_)
        )
    }
}
