//! Request layer used by the desk console.
//!
//! - [`RequestLayer`]: the fire-and-forget call contract
//! - [`HttpRequestLayer`]: reqwest implementation with `X-API-KEY` auth
//! - [`CredentialStore`]: shared access key slot, cleared on rejection
//! - [`RecordingRequestLayer`]: in-memory implementation for tests

pub mod credentials;
pub mod error;
pub mod http;
pub mod layer;
pub mod types;

pub use credentials::CredentialStore;
pub use error::{ApiError, ApiResult};
pub use http::{HttpRequestLayer, DEFAULT_TIMEOUT};
pub use layer::{RecordingRequestLayer, RequestLayer};
pub use types::{
    Ack, ApiCall, ApiReply, RemoteSettings, ServiceStatus, ACCESS_KEY_HEADER,
    CLOSE_BY_SIDE_PATH, CLOSE_MULTIPLE_PATH, CLOSE_POSITION_PATH, POSITIONS_PATH, SETTINGS_PATH,
    START_TRADING_PATH, STATUS_PATH, STOP_TRADING_PATH, SYNC_SLTP_PATH,
};
