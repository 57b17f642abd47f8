//! Request layer contract.
//!
//! Every call is fire-and-forget: it returns immediately and its completion
//! arrives later as an [`ApiReply`] on the channel the implementation was
//! built with. The console never awaits a call inline.

use crate::types::ApiCall;
use desk_core::TaskSubmission;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Outbound calls the console makes against the engine.
#[cfg_attr(test, automock)]
pub trait RequestLayer: Send {
    /// `GET /api/positions`, replied with [`crate::ApiReply::Positions`].
    fn fetch_positions(&self);

    /// `GET /api/settings`, replied with [`crate::ApiReply::Settings`].
    fn fetch_settings(&self);

    /// `POST /api/settings` with the complete snapshot.
    fn save_settings(&self, snapshot: Map<String, Value>);

    /// `POST` the submission payload to its endpoint.
    fn submit_task(&self, submission: TaskSubmission);

    /// `POST /api/trading/stop`.
    fn request_stop(&self);

    /// `GET /api/status`, used once at startup to resynchronize.
    fn fetch_status(&self);
}

/// Request layer that records calls instead of sending them.
///
/// Clones share the same record. Replies are fed back by the test.
#[derive(Debug, Clone, Default)]
pub struct RecordingRequestLayer {
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl RecordingRequestLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    /// Remove and return every call so far.
    pub fn take_calls(&self) -> Vec<ApiCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Task submissions so far.
    pub fn submissions(&self) -> Vec<TaskSubmission> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ApiCall::SubmitTask(sub) => Some(sub.clone()),
                _ => None,
            })
            .collect()
    }

    /// Settings snapshots saved so far.
    pub fn saves(&self) -> Vec<Map<String, Value>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ApiCall::SaveSettings(snapshot) => Some(snapshot.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }
}

impl RequestLayer for RecordingRequestLayer {
    fn fetch_positions(&self) {
        self.record(ApiCall::FetchPositions);
    }

    fn fetch_settings(&self) {
        self.record(ApiCall::FetchSettings);
    }

    fn save_settings(&self, snapshot: Map<String, Value>) {
        self.record(ApiCall::SaveSettings(snapshot));
    }

    fn submit_task(&self, submission: TaskSubmission) {
        self.record(ApiCall::SubmitTask(submission));
    }

    fn request_stop(&self) {
        self.record(ApiCall::RequestStop);
    }

    fn fetch_status(&self) {
        self.record(ApiCall::FetchStatus);
    }
}
