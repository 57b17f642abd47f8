//! Request and reply shapes exchanged with the engine's HTTP API.

use crate::error::ApiResult;
use desk_core::{Position, ProgressUpdate, TaskSubmission};
use serde::Deserialize;
use serde_json::{Map, Value};

// ============================================================================
// Endpoints
// ============================================================================

pub const POSITIONS_PATH: &str = "/api/positions";
pub const SETTINGS_PATH: &str = "/api/settings";
pub const STATUS_PATH: &str = "/api/status";
pub const START_TRADING_PATH: &str = "/api/trading/start";
pub const STOP_TRADING_PATH: &str = "/api/trading/stop";
pub const SYNC_SLTP_PATH: &str = "/api/trading/sync-sltp";
pub const CLOSE_POSITION_PATH: &str = "/api/positions/close";
pub const CLOSE_BY_SIDE_PATH: &str = "/api/positions/close-by-side";
pub const CLOSE_MULTIPLE_PATH: &str = "/api/positions/close-multiple";

/// Credential header attached when authenticated.
pub const ACCESS_KEY_HEADER: &str = "X-API-KEY";

// ============================================================================
// Replies
// ============================================================================

/// `GET /api/settings` body.
///
/// `user_settings` is kept untyped: merging it over the default template is
/// the settings synchronizer's job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub user_settings: Map<String, Value>,
    #[serde(default, alias = "all_available_coins")]
    pub available_coins: Vec<String>,
    #[serde(default)]
    pub available_long_coins: Vec<String>,
    #[serde(default)]
    pub available_short_coins: Vec<String>,
}

/// `GET /api/status` body: the engine's view of the current run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceStatus {
    #[serde(default, alias = "isRunning")]
    pub is_running: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Progress of the running task, when the engine reports one.
    #[serde(default)]
    pub progress: Option<ProgressUpdate>,
}

/// Acknowledgement body of a task or stop request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Completion of an outbound call, delivered back to the console as an
/// ordinary input.
#[derive(Debug)]
pub enum ApiReply {
    Positions(ApiResult<Vec<Position>>),
    Settings(ApiResult<RemoteSettings>),
    SettingsSaved(ApiResult<()>),
    TaskSubmitted {
        request_id: String,
        result: ApiResult<Ack>,
    },
    StopRequested(ApiResult<Ack>),
    Status(ApiResult<ServiceStatus>),
    /// The engine rejected the credential; the store has been cleared.
    CredentialRejected { status: u16 },
}

impl ApiReply {
    /// Label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Positions(_) => "positions",
            Self::Settings(_) => "settings",
            Self::SettingsSaved(_) => "settings_saved",
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::StopRequested(_) => "stop_requested",
            Self::Status(_) => "status",
            Self::CredentialRejected { .. } => "credential_rejected",
        }
    }
}

/// An outbound call, as recorded by [`crate::RecordingRequestLayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    FetchPositions,
    FetchSettings,
    SaveSettings(Map<String, Value>),
    SubmitTask(TaskSubmission),
    RequestStop,
    FetchStatus,
}
