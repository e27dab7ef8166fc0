//! Error types for Backend Service operations.

use thiserror::Error;

/// Errors surfaced by any Backend Service implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The transport failed before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("Backend error: {status} - {message}")]
    Status {
        /// HTTP-like status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// A channel join was refused by the service.
    #[error("Channel rejected: {0}")]
    ChannelRejected(String),

    /// The service did not answer in time.
    #[error("Operation timed out")]
    Timeout,

    /// The connection or channel is already closed.
    #[error("Connection closed")]
    Closed,

    /// A row could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No row matched the given id within the owner's scope.
    #[error("Row not found: {table}/{id}")]
    NotFound {
        /// Table name.
        table: String,
        /// Row id.
        id: String,
    },
}

/// Result type alias using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;
