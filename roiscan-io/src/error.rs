//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed or unserializable JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] roiscan_core::Error),
}
