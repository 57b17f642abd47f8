//! Link error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connect attempt timed out after {0} ms")]
    ConnectTimeout(u64),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Frame parse error: {0}")]
    ParseError(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
