//! Error types for the streaming adapter.
//!
//! The two terminal failure causes are deliberately distinct types:
//! [`StreamError::Failed`] carries the server's own error message for a job
//! that reached the failed state, while [`StreamError::PollBudgetExhausted`]
//! reports that the poll loop gave up without ever seeing a terminal status.
//! Callers can always tell the two apart.

use thiserror::Error;

/// Errors raised by job submission and the polling stream.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The initial submission was rejected.
    #[error("submit failed: {0}")]
    Submit(String),

    /// The submission response carried no job ID. Not retryable.
    #[error("server did not return a job id")]
    MissingJobId,

    /// The job reached the failed state; the message is the server's
    /// `errorMessage`, verbatim.
    #[error("{message}")]
    Failed {
        /// Server-reported failure message.
        message: String,
    },

    /// `maxPollAttempts` polls elapsed without a terminal status.
    #[error("timed out after {attempts} status polls")]
    PollBudgetExhausted {
        /// How many polls were spent.
        attempts: u32,
    },

    /// The server ended polling without reporting a terminal status
    /// (typically an expired or purged job record).
    #[error("server ended polling without a terminal status")]
    Ended,

    /// A transport-level problem (network, decode, unexpected body).
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_displays_server_message_verbatim() {
        let err = StreamError::Failed {
            message: "timeout".into(),
        };
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn test_budget_and_failure_are_distinct() {
        let budget = StreamError::PollBudgetExhausted { attempts: 300 };
        assert!(budget.to_string().contains("300"));
        assert!(!matches!(budget, StreamError::Failed { .. }));
    }
}
