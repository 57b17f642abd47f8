//! reqwest-backed request layer.
//!
//! Each call is spawned onto the tokio runtime and reports completion on an
//! unbounded reply channel. A 401/403 from the engine clears the stored
//! credential and emits [`ApiReply::CredentialRejected`] ahead of the failed
//! call's own reply.

use crate::credentials::CredentialStore;
use crate::error::{ApiError, ApiResult};
use crate::layer::RequestLayer;
use crate::types::{
    Ack, ApiReply, RemoteSettings, ServiceStatus, ACCESS_KEY_HEADER, POSITIONS_PATH,
    SETTINGS_PATH, STATUS_PATH, STOP_TRADING_PATH,
};
use desk_core::{Position, TaskSubmission};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct HttpCore {
    client: Client,
    base_url: String,
    credentials: CredentialStore,
    replies: mpsc::UnboundedSender<ApiReply>,
}

impl HttpCore {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials.header_value() {
            Some(key) => request.header(ACCESS_KEY_HEADER, key.as_str()),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ApiError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "Engine rejected the access key, clearing it");
            self.credentials.clear();
            self.reply(ApiReply::CredentialRejected {
                status: status.as_u16(),
            });
            return Err(ApiError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        debug!(path, "GET");
        self.execute(self.client.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> ApiResult<T> {
        debug!(path, "POST");
        self.execute(self.client.post(self.url(path)).json(body)).await
    }

    fn reply(&self, reply: ApiReply) {
        if self.replies.send(reply).is_err() {
            debug!("Reply receiver dropped");
        }
    }

    /// Run `call` in the background and deliver its reply.
    fn spawn<F, Fut>(&self, call: F)
    where
        F: FnOnce(HttpCore) -> Fut + Send + 'static,
        Fut: Future<Output = ApiReply> + Send + 'static,
    {
        let core = self.clone();
        tokio::spawn(async move {
            let replies = core.replies.clone();
            let reply = call(core).await;
            let _ = replies.send(reply);
        });
    }
}

/// Request layer talking to the engine over HTTP.
pub struct HttpRequestLayer {
    core: HttpCore,
}

impl HttpRequestLayer {
    /// Build a client for the engine at `base_url` (no trailing slash).
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: CredentialStore,
        replies: mpsc::UnboundedSender<ApiReply>,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(%base_url, authenticated = credentials.is_authenticated(), "Request layer ready");

        Ok(Self {
            core: HttpCore {
                client,
                base_url,
                credentials,
                replies,
            },
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.core.credentials
    }
}

impl RequestLayer for HttpRequestLayer {
    fn fetch_positions(&self) {
        self.core.spawn(|core| async move {
            ApiReply::Positions(core.get::<Vec<Position>>(POSITIONS_PATH).await)
        });
    }

    fn fetch_settings(&self) {
        self.core.spawn(|core| async move {
            ApiReply::Settings(core.get::<RemoteSettings>(SETTINGS_PATH).await)
        });
    }

    fn save_settings(&self, snapshot: Map<String, Value>) {
        self.core.spawn(move |core| async move {
            let body = Value::Object(snapshot);
            let result = core.post::<Value>(SETTINGS_PATH, &body).await.map(|_| ());
            ApiReply::SettingsSaved(result)
        });
    }

    fn submit_task(&self, submission: TaskSubmission) {
        self.core.spawn(move |core| async move {
            let result = core
                .post::<Ack>(&submission.endpoint, &submission.payload)
                .await;
            ApiReply::TaskSubmitted {
                request_id: submission.request_id,
                result,
            }
        });
    }

    fn request_stop(&self) {
        self.core.spawn(|core| async move {
            ApiReply::StopRequested(core.post::<Ack>(STOP_TRADING_PATH, &Value::Null).await)
        });
    }

    fn fetch_status(&self) {
        self.core.spawn(|core| async move {
            ApiReply::Status(core.get::<ServiceStatus>(STATUS_PATH).await)
        });
    }
}
