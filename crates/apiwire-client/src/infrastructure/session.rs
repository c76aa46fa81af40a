//! One authenticated connection to a device.
//!
//! # Moving parts
//!
//! ```text
//! exec() ──► encode ──► [core lock] enqueue + send ──► write task ──► socket
//!                              │
//!                        RequestQueue (FIFO)
//!                              ▲
//! socket ──► read task ──► SentenceParser ──► Reply ──► resolve oldest
//!                 │
//!                 └── watchdog: tears the connection down when no byte
//!                     arrives before the deadline
//! ```
//!
//! The wire carries no request identifiers, so the write order and the
//! queue order must never diverge.  `exec()` pushes its request onto the
//! queue and its sentence onto the outgoing channel inside one critical
//! section, without awaiting in between.  The write task owns the write
//! half and writes each sentence whole, so a caller that stops waiting on
//! `exec()` cannot leave half a sentence on the wire.
//!
//! Sentences issued while the socket is still opening wait in the channel
//! and go out, in order, as soon as the write task starts.
//!
//! # Watchdog
//!
//! One deadline covers the whole connection.  `connect()` arms it for the
//! socket open and login, every `exec()` re-arms it, and any received data
//! disarms it.  When it expires both tasks are aborted, which destroys the
//! socket, and every queued request fails with
//! [`ClientError::ConnectionTimeout`].  It is an inactivity guard, not a
//! per-request deadline.
//!
//! # Generations
//!
//! A session can reconnect after `Closed`.  Each connection gets a new
//! generation number; a task or a late teardown from an older connection
//! never touches the newer one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use apiwire_core::{encode_sentence, ParseEvent, Response, SentenceParser};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::auth::{authenticate, CommandExecutor};
use crate::application::request_queue::RequestQueue;
use crate::domain::{ClientConfig, ConnectionState, DisconnectReason};
use crate::error::ClientError;
use crate::infrastructure::connector::{BoxedStream, Connector, SocketConnector};

/// Size of each socket read.
const READ_CHUNK_SIZE: usize = 4096;

/// Encoded sentences on their way to the write task.
type Outgoing = mpsc::UnboundedSender<Vec<u8>>;

/// Who started a teardown.  A task must not abort itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Initiator {
    ReadTask,
    WriteTask,
    Caller,
}

/// Mutable connection bookkeeping, guarded by a short-lived std mutex that
/// is never held across an `.await`.
struct Core {
    state: ConnectionState,
    generation: u64,
    queue: RequestQueue,
    /// Watchdog deadline; `None` while disarmed.
    deadline: Option<Instant>,
    /// Sending side of the write task's channel.  Unbounded so that a send
    /// never waits while the core lock is held.
    outgoing: Option<Outgoing>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

struct Inner {
    id: Uuid,
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    core: Mutex<Core>,
    /// Wakes whoever watches the deadline so it picks up a new one.
    rearmed: Notify,
}

impl Inner {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A client session.
///
/// Share it by reference (or inside an `Arc`) to pipeline several `exec()`
/// calls; replies are matched to requests in issue order.
///
/// # Example
///
/// ```no_run
/// use apiwire_client::{AuthStrategy, ClientConfig, Session};
///
/// # async fn example() -> Result<(), apiwire_client::ClientError> {
/// let session = Session::new(ClientConfig::new("192.168.88.1", "admin", "", AuthStrategy::Plain));
/// session.connect().await?;
/// let interfaces = session.exec("/interface/print", [("?type", "ether")]).await?;
/// println!("{interfaces:?}");
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a session that dials real sockets.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(SocketConnector))
    }

    /// Creates a session whose byte stream comes from `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                connector,
                core: Mutex::new(Core {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    queue: RequestQueue::new(),
                    deadline: None,
                    outgoing: None,
                    reader: None,
                    writer: None,
                }),
                rearmed: Notify::new(),
            }),
        }
    }

    /// Identifier used in this session's log lines.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.core().state
    }

    /// Number of requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.core().queue.len()
    }

    /// Opens the socket and logs in.
    ///
    /// Resolves once the device accepted the login.  On any failure the
    /// connection is torn down and the session ends up `Closed`.  The
    /// watchdog already runs while the socket opens, and an `exec()` issued
    /// meanwhile pushes its deadline out like any other.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyConnected`] if a connection is live.
    /// - [`ClientError::ConnectFailed`] / [`ClientError::Tls`] if the socket
    ///   could not be opened.
    /// - [`ClientError::ConnectionTimeout`] if the watchdog fired first.
    /// - [`ClientError::ConnectionClosed`] if `close()` ran meanwhile.
    /// - [`ClientError::Command`] if the device rejected the login.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let (outgoing, pending) = mpsc::unbounded_channel();
        let generation = {
            let mut core = inner.core();
            if !core.state.can_connect() {
                return Err(ClientError::AlreadyConnected { state: core.state });
            }
            core.state = ConnectionState::Connecting;
            core.generation += 1;
            core.queue = RequestQueue::new();
            core.deadline = Some(Instant::now() + inner.config.timeout());
            core.outgoing = Some(outgoing);
            core.generation
        };
        info!(
            session = %inner.id,
            addr = %inner.config.address(),
            tls = inner.config.tls.is_some(),
            "connecting"
        );

        let mut opening = inner.connector.connect(&inner.config);
        let opened = loop {
            let deadline = {
                let core = inner.core();
                if core.generation != generation || core.state != ConnectionState::Connecting {
                    break Err(ClientError::ConnectionClosed);
                }
                core.deadline
            };
            tokio::select! {
                result = &mut opening => break result,
                _ = watchdog(deadline) => {
                    warn!(session = %inner.id, "transport did not open before the deadline");
                    teardown(inner, generation, DisconnectReason::Timeout, Initiator::Caller);
                    break Err(ClientError::ConnectionTimeout);
                }
                _ = inner.rearmed.notified() => {}
            }
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                debug!(session = %inner.id, "could not open transport: {e}");
                teardown(inner, generation, DisconnectReason::Closed, Initiator::Caller);
                return Err(e);
            }
        };

        self.install(stream, pending, generation)?;

        let config = &inner.config;
        if let Err(e) =
            authenticate(self, config.auth_strategy, &config.username, &config.password).await
        {
            warn!(session = %inner.id, "login failed: {e}");
            teardown(inner, generation, DisconnectReason::Closed, Initiator::Caller);
            return Err(e);
        }

        let mut core = inner.core();
        if core.generation != generation || core.state != ConnectionState::Authenticating {
            return Err(ClientError::ConnectionClosed);
        }
        core.state = ConnectionState::Ready;
        info!(session = %inner.id, "session ready");
        Ok(())
    }

    /// Starts the read and write tasks on a freshly opened stream.
    fn install(
        &self,
        stream: BoxedStream,
        pending: mpsc::UnboundedReceiver<Vec<u8>>,
        generation: u64,
    ) -> Result<(), ClientError> {
        let inner = &self.inner;
        let (read_half, write_half) = tokio::io::split(stream);

        let mut core = inner.core();
        if core.generation != generation || core.state != ConnectionState::Connecting {
            // Closed while the socket was opening.
            return Err(ClientError::ConnectionClosed);
        }
        core.state = ConnectionState::Authenticating;
        core.writer = Some(tokio::spawn(write_loop(
            Arc::clone(inner),
            write_half,
            pending,
            generation,
        )));
        core.reader = Some(tokio::spawn(read_loop(
            Arc::clone(inner),
            read_half,
            generation,
        )));
        debug!(session = %inner.id, "transport installed");
        Ok(())
    }

    /// Sends `command` with `params` and waits for its reply.
    ///
    /// Parameter keys starting with `?` are sent as query words; all others
    /// as `=key=value`.  May be called before `connect()` has finished; a
    /// request issued while the socket is still opening is written as soon
    /// as it opens, ahead of the login.
    ///
    /// Dropping the returned future does not withdraw the request: it still
    /// goes out whole and its reply is discarded.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Command`] if the device answered with `!trap`.
    /// - [`ClientError::NotConnected`] without a live connection.
    /// - [`ClientError::Protocol`] if a word is too long to encode.
    /// - Connection errors if the connection ends before the reply.
    pub async fn exec<I, K, V>(&self, command: &str, params: I) -> Result<Response, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.send(command, params).await
    }

    async fn send(
        &self,
        command: &str,
        params: Vec<(String, String)>,
    ) -> Result<Response, ClientError> {
        let inner = &self.inner;
        let sentence = encode_sentence(
            command,
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?;

        let completion = {
            let mut core = inner.core();
            let state = core.state;
            let Some(outgoing) = core.outgoing.as_ref().filter(|_| state.can_exec()) else {
                return Err(ClientError::NotConnected { state });
            };
            if outgoing.send(sentence).is_err() {
                // The write task is gone; its teardown is already under way.
                return Err(ClientError::ConnectionClosed);
            }
            core.deadline = Some(Instant::now() + inner.config.timeout());
            core.queue.enqueue(command)
        };
        inner.rearmed.notify_one();
        debug!(session = %inner.id, command, "request queued");

        completion.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Closes the connection.
    ///
    /// Disarms the watchdog, destroys the socket, and fails every queued
    /// request with [`ClientError::ConnectionClosed`] in FIFO order.  Never
    /// waits on the socket, so it returns even when the device has stopped
    /// reading.  Calling it again, or on a session that never connected,
    /// does nothing.
    pub async fn close(&self) {
        let generation = {
            let core = self.inner.core();
            if !core.state.is_live() {
                return;
            }
            core.generation
        };
        info!(session = %self.inner.id, "closing session");
        teardown(
            &self.inner,
            generation,
            DisconnectReason::Closed,
            Initiator::Caller,
        );
    }
}

#[async_trait]
impl CommandExecutor for Session {
    async fn exec_command(
        &self,
        command: &str,
        params: Vec<(String, String)>,
    ) -> Result<Response, ClientError> {
        self.send(command, params).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Both tasks hold their own reference; stop them so the socket goes.
        let mut core = self.inner.core();
        for task in [core.reader.take(), core.writer.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

// ── Socket tasks ──────────────────────────────────────────────────────────────

/// Resolves when `deadline` passes; never, when disarmed.
async fn watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Writes queued sentences, each one whole, until the channel closes or a
/// write fails.
async fn write_loop(
    inner: Arc<Inner>,
    mut writer: WriteHalf<BoxedStream>,
    mut pending: mpsc::UnboundedReceiver<Vec<u8>>,
    generation: u64,
) {
    while let Some(sentence) = pending.recv().await {
        let written = match writer.write_all(&sentence).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(session = %inner.id, "write failed: {e}");
            teardown(&inner, generation, DisconnectReason::Closed, Initiator::WriteTask);
            return;
        }
    }
    debug!(session = %inner.id, "outgoing channel closed");
}

/// Reads the socket until it fails, then tears the connection down.
async fn read_loop(inner: Arc<Inner>, mut reader: ReadHalf<BoxedStream>, generation: u64) {
    let mut parser = SentenceParser::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    let reason = loop {
        let deadline = inner.core().deadline;
        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) => {
                    debug!(session = %inner.id, "socket closed by peer");
                    break DisconnectReason::Closed;
                }
                Ok(n) => {
                    {
                        let mut core = inner.core();
                        if core.generation == generation {
                            core.deadline = None;
                        }
                    }
                    match parser.push(&chunk[..n]) {
                        Ok(events) => {
                            if let Some(reason) = dispatch(&inner, events) {
                                break reason;
                            }
                        }
                        Err(e) => {
                            warn!(session = %inner.id, "undecodable reply stream: {e}");
                            break DisconnectReason::Protocol(e);
                        }
                    }
                }
                Err(e) => {
                    warn!(session = %inner.id, "read failed: {e}");
                    break DisconnectReason::Closed;
                }
            },
            _ = watchdog(deadline) => {
                warn!(session = %inner.id, "no data before the deadline");
                break DisconnectReason::Timeout;
            }
            _ = inner.rearmed.notified() => {}
        }
    };

    drop(reader);
    teardown(&inner, generation, reason, Initiator::ReadTask);
}

/// Hands parsed replies to the queue.  Returns a reason when the connection
/// must end.
fn dispatch(inner: &Inner, events: Vec<ParseEvent>) -> Option<DisconnectReason> {
    let mut core = inner.core();
    for event in events {
        match event {
            ParseEvent::Reply(reply) => {
                if !core.queue.resolve(reply) {
                    warn!(session = %inner.id, "dropping reply with no pending request");
                }
            }
            ParseEvent::Fatal(message) => return Some(DisconnectReason::Fatal(message)),
        }
    }
    None
}

// ── Teardown ──────────────────────────────────────────────────────────────────

/// Ends connection `generation`.  Only the first call per connection acts.
///
/// Never awaits: the socket halves are owned by the two tasks, and aborting
/// them drops the socket even while a write is stuck.
fn teardown(inner: &Inner, generation: u64, reason: DisconnectReason, initiator: Initiator) {
    let (mut queue, reader, writer) = {
        let mut core = inner.core();
        if core.generation != generation || !core.state.is_live() {
            return;
        }
        core.state = ConnectionState::Closing;
        core.deadline = None;
        core.outgoing = None;
        (
            std::mem::take(&mut core.queue),
            core.reader.take(),
            core.writer.take(),
        )
    };

    if let Some(reader) = reader.filter(|_| initiator != Initiator::ReadTask) {
        reader.abort();
    }
    if let Some(writer) = writer.filter(|_| initiator != Initiator::WriteTask) {
        writer.abort();
    }
    // Wakes a `connect()` still waiting for the transport.
    inner.rearmed.notify_one();

    let failed = queue.fail_all(&reason);
    match &reason {
        DisconnectReason::Closed => {
            info!(session = %inner.id, failed, "connection closed");
        }
        other => {
            warn!(session = %inner.id, failed, reason = ?other, "connection torn down");
        }
    }

    let mut core = inner.core();
    if core.generation == generation {
        core.state = ConnectionState::Closed;
    }
}


// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AuthStrategy;

    fn config() -> ClientConfig {
        ClientConfig::new("127.0.0.1", "admin", "", AuthStrategy::Plain)
    }

    #[tokio::test]
    async fn test_new_session_is_disconnected() {
        let session = Session::new(config());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_exec_before_connect_is_not_connected() {
        // Arrange
        let session = Session::new(config());

        // Act
        let err = session
            .exec("/system/resource/print", Vec::<(String, String)>::new())
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(
            err,
            ClientError::NotConnected {
                state: ConnectionState::Disconnected
            }
        ));
    }

    #[tokio::test]
    async fn test_close_before_connect_is_noop() {
        let session = Session::new(config());
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_watchdog_disarmed_never_fires() {
        let fired = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            watchdog(None),
        )
        .await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let a = Session::new(config());
        let b = Session::new(config());
        assert_ne!(a.id(), b.id());
    }
}
