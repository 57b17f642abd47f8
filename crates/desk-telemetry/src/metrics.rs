//! Prometheus metrics for the desk console.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. Registration only fails on duplicate
//! metric names, which is a startup-time programming error.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};

/// Engine link state (1 = open, 0 = not open).
pub static LINK_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("desk_link_connected", "Engine link state (1=open)").unwrap()
});

/// Link closures that scheduled a reconnect.
/// Labels: reason (remote_close/socket_error/send_failed/liveness_timeout)
pub static LINK_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_link_reconnect_total",
        "Engine link closures followed by a scheduled reconnect",
        &["reason"]
    )
    .unwrap()
});

/// Heartbeat pings sent.
pub static HEARTBEAT_SENT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("desk_heartbeat_sent_total", "Heartbeat pings sent").unwrap()
});

/// Inbound frames by routing outcome.
/// Labels: tag (log/status/progress_update/position_closed/refresh_positions/pong/unknown/malformed)
pub static FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_frames_total",
        "Inbound event stream frames by routing outcome",
        &["tag"]
    )
    .unwrap()
});

/// Inbound frames dropped because they could not be decoded.
pub static FRAMES_DROPPED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "desk_frames_dropped_total",
        "Inbound frames dropped as malformed"
    )
    .unwrap()
});

/// Position close patches by outcome.
/// Labels: outcome (removed/scaled/unknown/duplicate)
pub static POSITION_PATCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_position_patch_total",
        "Pushed position close patches by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Task launches by outcome.
/// Labels: outcome (rejected/submitted/accepted/failed)
pub static TASK_SUBMISSION_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_task_submission_total",
        "Task launches by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Settings saves by outcome.
/// Labels: outcome (sent/ok/error)
pub static SETTINGS_SAVE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_settings_save_total",
        "Settings saves by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Request layer replies by kind and result.
pub static API_REPLY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_api_reply_total",
        "Request layer replies by kind and result",
        &["kind", "result"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn link_connected() {
        LINK_CONNECTED.set(1.0);
    }

    pub fn link_disconnected() {
        LINK_CONNECTED.set(0.0);
    }

    /// Record a closure that scheduled a reconnect.
    pub fn link_reconnect(reason: &str) {
        LINK_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn heartbeat_sent() {
        HEARTBEAT_SENT_TOTAL.inc();
    }

    /// Record a routed frame by outcome label.
    pub fn frame(tag: &str) {
        FRAMES_TOTAL.with_label_values(&[tag]).inc();
    }

    pub fn frame_dropped() {
        FRAMES_DROPPED_TOTAL.inc();
    }

    pub fn position_patch(outcome: &str) {
        POSITION_PATCH_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn task_submission(outcome: &str) {
        TASK_SUBMISSION_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn settings_save(outcome: &str) {
        SETTINGS_SAVE_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn api_reply(kind: &str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        API_REPLY_TOTAL.with_label_values(&[kind, result]).inc();
    }

    /// Text exposition of every registered metric.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_gauge() {
        Metrics::link_connected();
        assert_eq!(LINK_CONNECTED.get(), 1.0);
        Metrics::link_disconnected();
        assert_eq!(LINK_CONNECTED.get(), 0.0);
    }

    #[test]
    fn test_counters_by_label() {
        let before = FRAMES_TOTAL.with_label_values(&["status"]).get();
        Metrics::frame("status");
        Metrics::frame("status");
        assert_eq!(FRAMES_TOTAL.with_label_values(&["status"]).get(), before + 2.0);
    }

    #[test]
    fn test_render_includes_touched_metrics() {
        Metrics::link_reconnect("liveness_timeout");
        Metrics::settings_save("sent");
        let text = Metrics::render().unwrap();
        assert!(text.contains("desk_link_reconnect_total"));
        assert!(text.contains("desk_settings_save_total"));
    }
}
