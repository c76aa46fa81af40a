//! Connection lifecycle state machine.
//!
//! ```text
//! Disconnected ─connect()─► Connecting ─socket open─► Authenticating ─login ok─► Ready
//!                               │                           │                      │
//!                               └──────── error / timeout / !fatal / close() ──────┴─► Closing ─► Closed
//! ```
//!
//! `Closed` is terminal for one connection, but a session in `Closed` may
//! call `connect()` again to start a fresh one.

use std::fmt;

use apiwire_core::ProtocolError;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected.
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, login in progress.
    Authenticating,
    /// Logged in; commands may be issued.
    Ready,
    /// Teardown in progress.
    Closing,
    /// Connection gone.  Outstanding requests have all failed.
    Closed,
}

impl ConnectionState {
    /// `connect()` may start from here.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }

    /// Requests may be queued from here.  Requests issued before `Ready`
    /// share the connection with the login and keep their issue order.
    pub fn can_exec(self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating | Self::Ready)
    }

    /// A live connection exists that teardown has not started on.
    pub fn is_live(self) -> bool {
        self.can_exec()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a connection was torn down.  Every request still queued at teardown
/// fails with the error derived from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The inactivity watchdog fired.
    Timeout,
    /// Socket error, EOF, failed login, or an explicit `close()`.
    Closed,
    /// The server sent `!fatal` with this message.
    Fatal(String),
    /// The byte stream could not be decoded.
    Protocol(ProtocolError),
}
