//! Application layer for the client.
//!
//! - **`request_queue`** – FIFO of outstanding requests.  The protocol has no
//!   request identifiers, so replies complete requests strictly in order.
//! - **`auth`** – The login handshake (plain or challenge/response), written
//!   against the `CommandExecutor` trait so it runs without a socket in tests.

pub mod auth;
pub mod request_queue;
