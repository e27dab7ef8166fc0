//! Error types for the insight engine.

use saathi_backend::BackendError;
use thiserror::Error;

/// Errors that can occur while generating insights or answering questions.
#[derive(Error, Debug)]
pub enum EngineError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Completion Service answered 429
    #[error("Completion service rate limit exceeded")]
    RateLimited,

    /// Completion Service answered 402
    #[error("Completion service credits exhausted")]
    PaymentRequired,

    /// Any other non-success response
    #[error("Completion API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Missing API key
    #[error("Missing completion API key (set SAATHI_AI_API_KEY)")]
    MissingApiKey,

    /// Invalid response from API (missing expected fields)
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Reading or storing rows failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// No signed-in owner to scope the data to
    #[error("No owner id")]
    MissingOwner,

    /// The question was empty
    #[error("Message is empty")]
    EmptyMessage,
}

impl EngineError {
    /// Message suitable for showing to the shop owner.
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::RateLimited => {
                "Too many requests right now. Please wait a minute and try again."
            }
            EngineError::PaymentRequired => {
                "AI credits are used up. Please add credits to continue using insights."
            }
            EngineError::MissingApiKey => "The AI assistant is not configured on this device.",
            EngineError::MissingOwner => "Please sign in first.",
            EngineError::EmptyMessage => "Please type a question.",
            EngineError::Backend(_) => "Could not load your business data. Check your connection.",
            EngineError::Http(_) => "Could not reach the AI service. Check your connection.",
            EngineError::Json(_) | EngineError::ApiError { .. } | EngineError::InvalidResponse(_) => {
                "The AI service had a problem. Please try again."
            }
        }
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
