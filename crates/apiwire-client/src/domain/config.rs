//! Client configuration types.
//!
//! [`ClientConfig`] is a plain struct: it can be built in code or parsed from
//! TOML text with [`ClientConfig::from_toml_str`].  Locating or watching a
//! configuration file is left to the embedding application.
//!
//! ```toml
//! host = "192.168.88.1"
//! username = "admin"
//! password = "secret"
//! auth_strategy = "plain"
//! timeout_ms = 5000
//!
//! [tls]
//! server_name = "router.lan"
//! ca_file = "/etc/apiwire/ca.pem"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent.  `auth_strategy` deliberately has
//! no default: which login a device expects depends on its firmware, and a
//! wrong guess fails in a confusing way.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default port of the plain-text API service.
pub const DEFAULT_PLAIN_PORT: u16 = 8728;
/// Default port of the TLS API service.
pub const DEFAULT_TLS_PORT: u16 = 8729;
/// Default inactivity window in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Error type for configuration parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How the client proves its identity right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    /// Send name and password in a single `/login`.
    Plain,
    /// Legacy two-step login: fetch a challenge, answer with a keyed digest.
    Challenge,
}

/// Options for the encrypted transport.  Presence of this section is what
/// selects TLS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Name used for SNI and certificate verification.  Defaults to `host`.
    #[serde(default)]
    pub server_name: Option<String>,
    /// PEM file with the CA certificates to trust.  When absent the bundled
    /// web PKI roots are used.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
}

/// All settings needed to open and authenticate one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Device host name or IP address.
    pub host: String,
    /// API port.  Defaults to 8728, or 8729 when `tls` is present.
    #[serde(default)]
    pub port: Option<u16>,
    /// Login name.
    pub username: String,
    /// Login password.
    #[serde(default)]
    pub password: String,
    /// Encrypted transport options; `None` means plain TCP.
    #[serde(default)]
    pub tls: Option<TlsOptions>,
    /// Inactivity window in milliseconds for the connection watchdog.
    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,
    /// Login flavour the device expects.
    pub auth_strategy: AuthStrategy,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl ClientConfig {
    /// Builds a plain-TCP configuration with default port and timeout.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        auth_strategy: AuthStrategy,
    ) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: username.into(),
            password: password.into(),
            tls: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auth_strategy,
        }
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or a
    /// required field is missing.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The port actually dialled.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.tls.is_some() {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PLAIN_PORT
        })
    }

    /// The watchdog window as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host:port`, for log lines and error messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.effective_port())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
