//! Error types for bridge operations.

use crate::processor::ProcessorState;
use thiserror::Error;

/// Errors surfaced to the caller of processor lifecycle operations.
///
/// Nearly everything else is recovered in-loop; only startup capability
/// failures and illegal state transitions propagate.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The requested state transition is not legal from the current state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ProcessorState,
        to: ProcessorState,
    },

    /// The worker pool was already started.
    #[error("worker pool already started")]
    PoolStarted,

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Transport(#[from] PublishError),
}

/// Errors from the broker capability.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Read/claim/ack/delete failed at the backend.
    #[error("broker i/o error: {0}")]
    Io(String),

    /// Consumer-group operation failed.
    #[error("consumer group error: {0}")]
    Group(String),
}

/// Errors from the transport capability and the circuit breaker around it.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Circuit breaker is open; the publish was not attempted.
    #[error("circuit breaker open: transport unavailable")]
    CircuitOpen,
}

/// Errors from worker pool submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The worker message queue rejected the item.
    #[error("worker queue is full")]
    QueueFull,

    /// The pool has been stopped.
    #[error("worker pool is stopped")]
    Stopped,
}

impl SubmitError {
    /// Returns `true` if the submission may succeed later.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueueFull)
    }
}
