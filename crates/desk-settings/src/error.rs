//! Settings error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// Saving before a successful load would overwrite the engine's file with
    /// defaults.
    #[error("Settings not loaded yet")]
    NotLoaded,

    #[error("Invalid value for setting {field}: {value}")]
    InvalidField { field: String, value: String },

    #[error("Settings snapshot is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SettingsResult<T> = Result<T, SettingsError>;
