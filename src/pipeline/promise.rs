// src/pipeline/promise.rs
//! Write completion signalling
//!
//! Every outbound write carries a `WritePromise` through the pipeline. The
//! stage that finishes the write (the transport, or a stage that drops the
//! message) resolves it exactly once; the writer holds the matching
//! `WriteFuture`.

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// How a write finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Handed to the transport
    Delivered,
    /// Dropped by an observer; still a successful completion for the writer
    Cancelled,
}

/// A write that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("write failed: {reason}")]
pub struct WriteFailure {
    reason: String,
}

impl WriteFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn dropped() -> Self {
        Self::new("write promise dropped without completion")
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub type WriteResult = std::result::Result<WriteStatus, WriteFailure>;

/// Completion handle travelling with an outbound message
#[derive(Debug)]
pub struct WritePromise {
    tx: Option<oneshot::Sender<WriteResult>>,
}

impl WritePromise {
    /// Create a promise and the future observing it
    pub fn channel() -> (Self, WriteFuture) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, WriteFuture { rx })
    }

    /// A promise nobody waits on
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn is_detached(&self) -> bool {
        self.tx.is_none()
    }

    pub fn succeed(mut self, status: WriteStatus) {
        self.complete(Ok(status));
    }

    pub fn fail(mut self, failure: WriteFailure) {
        self.complete(Err(failure));
    }

    fn complete(&mut self, result: WriteResult) {
        if let Some(tx) = self.tx.take() {
            // The writer may have stopped listening
            let _ = tx.send(result);
        }
    }
}

/// Writer-side view of a `WritePromise`
#[derive(Debug)]
pub struct WriteFuture {
    rx: oneshot::Receiver<WriteResult>,
}

impl WriteFuture {
    /// Non-blocking check, `None` while the write is still in flight
    pub fn try_wait(&mut self) -> Option<WriteResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(WriteFailure::dropped())),
        }
    }

    /// Wait for the write to complete
    pub async fn wait(self) -> WriteResult {
        self.rx.await.unwrap_or_else(|_| Err(WriteFailure::dropped()))
    }
}
