//! Domain layer: configuration and connection lifecycle types (no I/O).

pub mod config;
pub mod state;

pub use config::{AuthStrategy, ClientConfig, ConfigError, TlsOptions};
pub use state::{ConnectionState, DisconnectReason};
