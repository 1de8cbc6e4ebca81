//! Correlation table for request/response calls.
//!
//! Each outstanding `method` frame is registered under its request id with
//! a oneshot reply channel and a deadline. Replies resolve and remove the
//! entry; a reset fails every entry with [`RlError::ConnectionLost`].

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use rl_core::error::{RlError, RlResult};

/// Thirty years, the horizon used for deadlines that never come.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + delay`, or a far-future instant when that is not representable.
pub(crate) fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

struct PendingRequest {
    operation: String,
    deadline: Instant,
    reply: oneshot::Sender<RlResult<Value>>,
}

/// Caller side of a registered request.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<RlResult<Value>>,
}

impl PendingReply {
    /// A reply that is already failed.
    pub fn rejected(err: RlError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> RlResult<Value> {
        self.rx.await.unwrap_or(Err(RlError::ConnectionLost))
    }

    /// Non-blocking check, mostly for tests and synchronous callers.
    pub fn try_take(&mut self) -> Option<RlResult<Value>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(RlError::ConnectionLost)),
        }
    }
}

pub struct CorrelationTable {
    entries: HashMap<String, PendingRequest>,
    timeout: Duration,
}

impl CorrelationTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
        }
    }

    /// Register `request_id` for `operation`, due `timeout` from now.
    pub fn register(&mut self, request_id: impl Into<String>, operation: impl Into<String>) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let request_id = request_id.into();
        let operation = operation.into();
        debug!("awaiting {operation} response for request {request_id}");
        let previous = self.entries.insert(
            request_id.clone(),
            PendingRequest {
                operation,
                deadline: deadline_after(self.timeout),
                reply: tx,
            },
        );
        if previous.is_some() {
            warn!("request id {request_id} reused while still pending");
        }
        PendingReply { rx }
    }

    /// Complete and remove `request_id`. Unknown ids are a no-op.
    pub fn resolve(&mut self, request_id: &str, result: RlResult<Value>) -> bool {
        match self.entries.remove(request_id) {
            Some(pending) => {
                debug!("request {request_id} ({}) resolved", pending.operation);
                // The caller may have stopped waiting.
                let _ = pending.reply.send(result);
                true
            }
            None => {
                debug!("response for unknown request {request_id} ignored");
                false
            }
        }
    }

    /// Operation name of an outstanding request.
    pub fn operation(&self, request_id: &str) -> Option<&str> {
        self.entries.get(request_id).map(|p| p.operation.as_str())
    }

    /// Fail every outstanding request with `ConnectionLost`.
    pub fn fail_all(&mut self) -> usize {
        let count = self.entries.len();
        for (request_id, pending) in self.entries.drain() {
            debug!("request {request_id} ({}) lost with its connection", pending.operation);
            let _ = pending.reply.send(Err(RlError::ConnectionLost));
        }
        count
    }

    /// Fail every request whose deadline is at or before `now` with a
    /// timeout. Returns the expired ids.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for request_id in &expired {
            if let Some(pending) = self.entries.remove(request_id) {
                warn!(
                    "request {request_id} ({}) timed out after {:?}",
                    pending.operation, self.timeout
                );
                let _ = pending.reply.send(Err(RlError::Timeout(format!(
                    "{} request {request_id} got no response",
                    pending.operation
                ))));
            }
        }
        expired
    }

    /// Earliest deadline among outstanding requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|p| p.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
