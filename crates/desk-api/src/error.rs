//! Request layer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The engine rejected the stored credential (401/403).
    #[error("Credential rejected (HTTP {0})")]
    Unauthorized(u16),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request layer shut down")]
    ChannelClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
