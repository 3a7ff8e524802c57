use thiserror::Error;

use crate::domain::reporting::AccessDenied;

/// Storage failures. The in-memory store can only fail on poisoned locks;
/// a networked store would surface its connectivity loss the same way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage lock poisoned during {0}")]
    LockPoisoned(&'static str),

    /// A compare-and-swap write found the row changed since it was read.
    /// The whole transaction aborts; the caller re-reads and retries.
    #[error("write conflict on {kind} {key}")]
    WriteConflict { kind: &'static str, key: String },
}

/// Broker-side failures, seen by the relay and the consumption loop.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    ConnectionFailed(String),

    #[error("broker rejected the message: {0}")]
    Rejected(String),

    #[error("broker lock poisoned")]
    LockPoisoned,
}

/// Failure to turn a wire envelope back into a domain event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The `(topic, schema)` pair names no known event shape. Not fatal:
    /// newer producers may emit types this consumer does not understand yet.
    #[error("no decoder for ({topic}, {schema})")]
    UnknownSchema { topic: String, schema: String },

    #[error("event {schema} is missing field {field}")]
    MissingField { schema: String, field: &'static str },

    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Failure of a single saga handler. Rolls back the handler's unit of work
/// and leaves the consumer offset where it was, so the event is redelivered.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("handler failed: {0}")]
    Other(String),
}

/// Errors surfaced synchronously to request callers. Infrastructure retries
/// stay inside the relay and the consumption loop and never show up here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no {kind} found for order {order_id}")]
    NotFound { kind: &'static str, order_id: String },

    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
}
