use std::time::Duration;

use thiserror::Error;

use crate::types::JobId;

/// Failures raised by a [`crate::store::JobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

/// Failures raised by a [`crate::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// A failed handler invocation.
///
/// None of these escape the dispatch loop: each is classified against the
/// retry policy and recorded on the job row as an error description. An
/// unknown binding is deliberately in here rather than its own class, since
/// the original dispatch semantics retry it like any application error.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("no handler registered for binding: {0}")]
    UnknownBinding(String),

    #[error("failed to decode payload: {0}")]
    DecodePayload(#[from] bincode::error::DecodeError),

    #[error("failed to encode handler output: {0}")]
    EncodeOutput(#[from] bincode::error::EncodeError),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Application-level failure with a message that ends up on the job row.
    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}

/// Errors surfaced to the enqueue caller. The engine does not retry enqueue
/// itself; retrying is the caller's responsibility.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("binding name must not be empty")]
    EmptyBinding,

    #[error("failed to encode payload: {0}")]
    EncodePayload(#[from] bincode::error::EncodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
