//! Error types for Supabase gateway operations.

use saathi_backend::BackendError;
use thiserror::Error;

/// Error type for every Supabase call, REST or Realtime.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Supabase returned a non-success HTTP status.
    ///
    /// Common causes: expired access token, RLS policy violation, schema
    /// mismatch.
    #[error("Supabase error: {status} - {message}")]
    Supabase {
        /// The HTTP status code returned by Supabase.
        status: u16,
        /// The response body, typically containing error details.
        message: String,
    },

    /// WebSocket error on the Realtime socket.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server answered `phx_join` with an error status.
    #[error("Channel {topic} rejected: {reason}")]
    JoinRejected { topic: String, reason: String },

    /// No row matched an update or delete.
    #[error("Row {id} not found in {table}")]
    NotFound { table: String, id: String },

    /// Operation timed out (e.g. no `phx_reply` to a join).
    #[error("Operation timed out")]
    Timeout,

    /// The Realtime socket went away while a request was outstanding.
    #[error("Realtime connection closed")]
    ConnectionClosed,

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid project URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration or initialization error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<GatewayError> for BackendError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Supabase { status, message } => BackendError::Status { status, message },
            GatewayError::JoinRejected { reason, .. } => BackendError::ChannelRejected(reason),
            GatewayError::NotFound { table, id } => BackendError::NotFound { table, id },
            GatewayError::Timeout => BackendError::Timeout,
            GatewayError::ConnectionClosed => BackendError::Closed,
            GatewayError::Json(err) => BackendError::Json(err),
            other => BackendError::Transport(other.to_string()),
        }
    }
}
