//! Task submission envelope.

use crate::error::{CoreError, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload key the engine uses to deduplicate task launches.
pub const REQUEST_ID_FIELD: &str = "request_id";

/// Generate a fresh request identifier.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// A single task launch, alive only until the submission call resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSubmission {
    /// Unique per launch; also embedded in `payload`.
    pub request_id: String,
    /// Engine endpoint path (e.g. "/api/trading/start").
    pub endpoint: String,
    /// JSON object body, carrying `request_id`.
    pub payload: Value,
    /// Name shown with the progress bar.
    pub task_name: String,
    /// Units of work the task is expected to report on.
    pub total_units: u64,
}

impl TaskSubmission {
    /// Build a submission with a fresh request id attached to the payload.
    ///
    /// `payload` must be a JSON object (or null, treated as empty).
    pub fn new(
        endpoint: impl Into<String>,
        payload: Value,
        task_name: impl Into<String>,
        total_units: u64,
    ) -> Result<Self> {
        let mut body = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(CoreError::PayloadNotObject(other.to_string())),
        };
        let request_id = new_request_id();
        body.insert(
            REQUEST_ID_FIELD.to_string(),
            Value::String(request_id.clone()),
        );

        Ok(Self {
            request_id,
            endpoint: endpoint.into(),
            payload: Value::Object(body),
            task_name: task_name.into(),
            total_units,
        })
    }
}
