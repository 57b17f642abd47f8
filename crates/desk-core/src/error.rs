//! Error types for desk-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid position side: {0}")]
    InvalidSide(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Task payload must be a JSON object, got: {0}")]
    PayloadNotObject(String),

    #[error("Size scaling overflowed for {full_symbol} (factor {factor})")]
    ScaleOverflow { full_symbol: String, factor: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
