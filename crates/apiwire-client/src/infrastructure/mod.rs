//! Infrastructure layer for the client.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `apiwire_core`, but MUST NOT be imported by the `application` or `domain`
//! layers.
//!
//! - **`connector`** – Opens the byte stream: plain TCP, or TCP wrapped in
//!   TLS when the configuration has a `tls` section.
//! - **`session`** – Owns the stream, the read task, the watchdog, and the
//!   request queue; exposes `connect`, `exec`, and `close`.

pub mod connector;
pub mod session;
