//! Positional request/reply correlation.
//!
//! Requests carry no identifier on the wire, so the only way to know which
//! request a reply answers is order: the Nth terminal reply completes the
//! Nth request still waiting.  [`RequestQueue`] is that FIFO.  Callers must
//! enqueue in exactly the order sentences are written to the socket.

use std::collections::VecDeque;

use apiwire_core::{Reply, Response};
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::DisconnectReason;
use crate::error::ClientError;

/// Outcome delivered to whoever awaits a request.
pub type RequestOutcome = Result<Response, ClientError>;

/// Receiving end of a queued request.  Resolves exactly once.
pub type Completion = oneshot::Receiver<RequestOutcome>;

/// One request waiting for its terminal reply.
#[derive(Debug)]
pub struct PendingRequest {
    /// Command path, kept for log lines.
    command: String,
    responder: oneshot::Sender<RequestOutcome>,
}

impl PendingRequest {
    /// The command this request was issued for.
    pub fn command(&self) -> &str {
        &self.command
    }

    fn complete(self, outcome: RequestOutcome) {
        if self.responder.send(outcome).is_err() {
            debug!("caller stopped waiting for {}", self.command);
        }
    }
}

/// FIFO of outstanding requests.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<PendingRequest>,
}

impl RequestQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request and returns the handle its reply will arrive on.
    pub fn enqueue(&mut self, command: impl Into<String>) -> Completion {
        let (responder, completion) = oneshot::channel();
        self.pending.push_back(PendingRequest {
            command: command.into(),
            responder,
        });
        completion
    }

    /// Completes the oldest request with `reply`.
    ///
    /// A `!trap` reply becomes [`ClientError::Command`].  Returns `false` if no
    /// request was waiting, in which case the reply is dropped.
    pub fn resolve(&mut self, reply: Reply) -> bool {
        let Some(request) = self.pending.pop_front() else {
            return false;
        };
        debug!(command = %request.command, trap = reply.is_trap(), "reply matched");
        request.complete(reply.into_result().map_err(ClientError::from_trap));
        true
    }

    /// Fails every queued request, oldest first.  Returns how many failed.
    pub fn fail_all(&mut self, reason: &DisconnectReason) -> usize {
        let count = self.pending.len();
        while let Some(request) = self.pending.pop_front() {
            request.complete(Err(ClientError::from_disconnect(reason)));
        }
        count
    }

    /// The oldest waiting request, if any.
    pub fn front(&self) -> Option<&PendingRequest> {
        self.pending.front()
    }

    /// Number of requests waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// `true` when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use apiwire_core::Attributes;
    use tokio_test::{assert_pending, assert_ready, task};

    fn attrs(key: &str, value: &str) -> Attributes {
        let mut map = Attributes::new();
        map.insert(key.to_string(), value.to_string());
        map
    }

    #[test]
    fn test_replies_complete_requests_in_fifo_order() {
        // Arrange
        let mut queue = RequestQueue::new();
        let completions: Vec<_> = (0..5).map(|i| queue.enqueue(format!("/cmd{i}"))).collect();

        // Act
        for i in 0..5 {
            assert!(queue.resolve(Reply::Done(attrs("n", &i.to_string()))));
        }

        // Assert
        for (i, mut completion) in completions.into_iter().enumerate() {
            let outcome = completion.try_recv().expect("resolved");
            assert_eq!(outcome.unwrap(), Response::Map(attrs("n", &i.to_string())));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_trap_reply_fails_only_its_request() {
        let mut queue = RequestQueue::new();
        let mut first = queue.enqueue("/bad");
        let mut second = queue.enqueue("/good");

        queue.resolve(Reply::Trap(attrs("message", "no such command")));

        let err = first.try_recv().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "no such command");
        assert!(second.try_recv().is_err(), "second request still pending");
        assert_eq!(queue.front().map(PendingRequest::command), Some("/good"));
    }

    #[test]
    fn test_resolve_on_empty_queue_returns_false() {
        let mut queue = RequestQueue::new();
        assert!(!queue.resolve(Reply::Done(Attributes::new())));
    }

    #[test]
    fn test_fail_all_fails_every_request_with_reason() {
        // Arrange
        let mut queue = RequestQueue::new();
        let completions: Vec<_> = (0..3).map(|_| queue.enqueue("/x")).collect();

        // Act
        let failed = queue.fail_all(&DisconnectReason::Fatal("terminated".to_string()));

        // Assert
        assert_eq!(failed, 3);
        for mut completion in completions {
            let err = completion.try_recv().unwrap().unwrap_err();
            assert!(matches!(err, ClientError::ProtocolFatal(ref m) if m == "terminated"));
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_completion_stays_pending_until_reply() {
        let mut queue = RequestQueue::new();
        let mut completion = task::spawn(queue.enqueue("/interface/print"));

        assert_pending!(completion.poll());

        queue.resolve(Reply::DoneList(vec![attrs("name", "ether1")]));
        let outcome = assert_ready!(completion.poll()).expect("sender not dropped");
        assert_eq!(
            outcome.unwrap(),
            Response::List(vec![attrs("name", "ether1")])
        );
    }

    #[test]
    fn test_dropped_caller_does_not_break_queue() {
        let mut queue = RequestQueue::new();
        drop(queue.enqueue("/abandoned"));
        let mut next = queue.enqueue("/next");

        assert!(queue.resolve(Reply::Done(Attributes::new())));
        assert!(queue.resolve(Reply::Done(attrs("ok", "yes"))));

        assert_eq!(next.try_recv().unwrap().unwrap(), Response::Map(attrs("ok", "yes")));
    }
}
