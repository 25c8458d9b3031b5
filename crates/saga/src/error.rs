//! Saga error types.

use common::ChannelName;
use thiserror::Error;
use transport::TransportError;

/// Errors that can occur during saga construction and dispatch.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step was never given a forward command.
    #[error("Step {index} on channel '{channel}' has no forward command")]
    MissingForwardCommand { index: usize, channel: ChannelName },

    /// Creating or subscribing to a step channel failed during processor setup.
    #[error("Transport initialization failed for channel '{channel}': {source}")]
    TransportInit {
        channel: ChannelName,
        source: TransportError,
    },

    /// An envelope could not be published.
    #[error("Failed to publish envelope to channel '{channel}': {source}")]
    Publish {
        channel: ChannelName,
        source: TransportError,
    },

    /// Envelope encoding or decoding error.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Errors produced while encoding or decoding a saga envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope could not be serialized.
    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The message is not a saga envelope.
    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope's payload does not match the saga's payload type.
    #[error("Invalid envelope payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// The saga phase is neither `STEP_FORWARD` nor `STEP_BACKWARD`.
    #[error("Unrecognized saga phase: {0}")]
    UnrecognizedPhase(String),

    /// The step index does not exist in the saga definition.
    #[error("Step index {index} out of range for a saga of {len} steps")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Failure reported by a forward or compensation command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CommandError {
    reason: String,
}

impl CommandError {
    /// Creates a command error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<String> for CommandError {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl From<&str> for CommandError {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
