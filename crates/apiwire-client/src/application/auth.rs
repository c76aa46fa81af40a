//! Login handshake performed right after the socket opens.
//!
//! Two strategies exist and the device decides which one works:
//!
//! - **Plain** – one `/login` carrying `name` and `password`.
//! - **Challenge** – the legacy exchange:
//!
//! ```text
//! Client                                   Device
//! ──────                                   ──────
//! /login                          ───►
//!                                 ◄───     !done =ret=<hex challenge>
//! /login =name=<user>
//!        =response=00<hex md5(0x00 ‖ password ‖ challenge)>
//!                                 ───►
//!                                 ◄───     !done
//! ```
//!
//! A `!trap` at any step fails the handshake with the trap's message.
//!
//! The handshake only needs "send a command, await its reply", expressed as
//! the [`CommandExecutor`] trait so it can be tested without a socket.

use apiwire_core::Response;
use async_trait::async_trait;
use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::domain::AuthStrategy;
use crate::error::ClientError;

/// Command path of both login steps.
pub const LOGIN_COMMAND: &str = "/login";
/// Attribute carrying the hex challenge in the first legacy reply.
const CHALLENGE_KEY: &str = "ret";

/// Anything that can issue a command and await its reply.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Sends `command` with `params` and waits for the matching reply.
    async fn exec_command(
        &self,
        command: &str,
        params: Vec<(String, String)>,
    ) -> Result<Response, ClientError>;
}

/// Runs the login handshake for `strategy`.
///
/// # Errors
///
/// - [`ClientError::Command`] if the device traps either step.
/// - [`ClientError::Authentication`] if the challenge reply has no usable
///   `ret` attribute.
/// - Any connection error raised while waiting.
pub async fn authenticate<E>(
    executor: &E,
    strategy: AuthStrategy,
    username: &str,
    password: &str,
) -> Result<(), ClientError>
where
    E: CommandExecutor + ?Sized,
{
    debug!(?strategy, username, "starting login");
    match strategy {
        AuthStrategy::Plain => {
            let params = vec![
                ("name".to_string(), username.to_string()),
                ("password".to_string(), password.to_string()),
            ];
            executor.exec_command(LOGIN_COMMAND, params).await?;
        }
        AuthStrategy::Challenge => {
            let reply = executor.exec_command(LOGIN_COMMAND, Vec::new()).await?;
            let challenge = reply
                .as_map()
                .and_then(|attributes| attributes.get(CHALLENGE_KEY))
                .ok_or_else(|| {
                    ClientError::Authentication("login reply carried no challenge".to_string())
                })?;
            let response = challenge_response(password, challenge)?;
            let params = vec![
                ("name".to_string(), username.to_string()),
                ("response".to_string(), response),
            ];
            executor.exec_command(LOGIN_COMMAND, params).await?;
        }
    }
    info!(username, "login accepted");
    Ok(())
}

/// Computes the answer to a legacy login challenge.
///
/// The digest is MD5 over a zero byte, the password bytes, and the decoded
/// challenge bytes; the answer is `"00"` followed by the lowercase hex digest.
///
/// # Errors
///
/// Returns [`ClientError::Authentication`] if `challenge_hex` is not hex.
pub fn challenge_response(password: &str, challenge_hex: &str) -> Result<String, ClientError> {
    let challenge = hex::decode(challenge_hex)
        .map_err(|e| ClientError::Authentication(format!("malformed challenge: {e}")))?;
    let mut hasher = Md5::new();
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.update(&challenge);
    Ok(format!("00{}", hex::encode(hasher.finalize())))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
