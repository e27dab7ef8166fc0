//! Error types for panel operations.

use saathi_backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    /// Fetching or writing rows failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A bill could not be computed from its lines.
    #[error("Invalid bill: {0}")]
    InvalidBill(String),
}

pub type PanelResult<T> = Result<T, PanelError>;
