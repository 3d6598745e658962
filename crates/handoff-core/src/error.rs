use std::fmt;
use thiserror::Error;

/// Errors returned by session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("connection rejected")]
    ConnectionRejected,

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("file unavailable")]
    FileUnavailable,

    #[error("cannot {action} while {state}")]
    InvalidStateTransition { action: &'static str, state: &'static str },
}

/// Why a session ended in Failed. Display is the status text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    TransportUnavailable(String),
    ConnectionRejected,
    ConnectionError(String),
    FileUnavailable,
    Disconnected,
    TransferFailed,
    TimedOut,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TransportUnavailable(msg) => f.write_str(msg),
            FailureReason::ConnectionRejected => f.write_str("Connection rejected"),
            FailureReason::ConnectionError(msg) => f.write_str(msg),
            FailureReason::FileUnavailable => f.write_str("File not found"),
            FailureReason::Disconnected => f.write_str("Connection disconnected"),
            FailureReason::TransferFailed => f.write_str("Transfer failed"),
            FailureReason::TimedOut => f.write_str("Timed out"),
        }
    }
}

impl From<FailureReason> for HandoffError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::TransportUnavailable(msg) => HandoffError::TransportUnavailable(msg),
            FailureReason::ConnectionRejected => HandoffError::ConnectionRejected,
            FailureReason::FileUnavailable => HandoffError::FileUnavailable,
            other => HandoffError::ConnectionError(other.to_string()),
        }
    }
}
