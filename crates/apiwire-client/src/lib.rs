//! apiwire-client library entry point.
//!
//! An async client for the sentence-based device administration API.  One
//! [`Session`] owns one connection (plain TCP or TLS), logs in, and then
//! issues commands whose replies are matched to requests strictly in order.
//!
//! # Architecture
//!
//! ```text
//! [apiwire-client]
//!   ├── domain/           ClientConfig, AuthStrategy, ConnectionState
//!   ├── application/      RequestQueue (FIFO correlation), login handshake
//!   └── infrastructure/
//!         ├── connector/  TCP and rustls TLS stream opening
//!         └── session/    state machine, read task, watchdog
//! ```
//!
//! The byte-level codec and the streaming parser live in `apiwire-core`.
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `apiwire-core`, and talks to the
//!   connection only through the `CommandExecutor` trait.
//! - `infrastructure` depends on everything else plus `tokio` and `rustls`.

/// Domain layer: configuration and lifecycle types.
pub mod domain;

/// Application layer: request correlation and authentication.
pub mod application;

/// Infrastructure layer: transports and the session itself.
pub mod infrastructure;

/// Error taxonomy.
pub mod error;

pub use apiwire_core::{Attributes, Reply, Response};
pub use domain::{AuthStrategy, ClientConfig, ConfigError, ConnectionState, TlsOptions};
pub use error::ClientError;
pub use infrastructure::connector::{BoxedStream, Connector, SocketConnector};
pub use infrastructure::session::Session;
