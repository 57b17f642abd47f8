//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] desk_core::CoreError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] desk_ws::WsError),

    #[error("Request layer error: {0}")]
    Api(#[from] desk_api::ApiError),

    #[error("Settings error: {0}")]
    Settings(#[from] desk_settings::SettingsError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] desk_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
