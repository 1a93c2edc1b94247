//! Structured error types for conveyor.
//!
//! `ConveyorError` provides pattern-matchable errors instead of generic
//! `anyhow::Error`. Codec failures are permanent (a payload that does not
//! deserialize today will not deserialize on redelivery either), so consumers
//! should treat them as non-retryable and let the message age into the
//! dead-letter queue.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by queue and consumer operations.
#[derive(Debug, Error)]
pub enum ConveyorError {
    /// The payload could not be serialized for enqueueing.
    #[error("failed to encode message payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload could not be deserialized by the consumer.
    #[error("failed to decode message payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The receipt does not match the current delivery of the message.
    ///
    /// This happens when a message's visibility timeout expired and it was
    /// redelivered before the original consumer acknowledged it. The late
    /// ack/nack is rejected so the newer delivery stays authoritative.
    #[error("receipt is stale or unknown for message {message_id}")]
    StaleReceipt {
        /// The message the receipt referred to.
        message_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConveyorError::StaleReceipt {
            message_id: Uuid::nil(),
        };
        assert!(err.to_string().contains("stale or unknown"));
    }
}
