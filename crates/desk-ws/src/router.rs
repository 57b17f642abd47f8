//! Inbound frame routing.
//!
//! Turns raw text frames into calls on a [`FrameSink`]. Each frame reaches at
//! most one sink method. Liveness replies and unknown tags reach none, and a
//! frame that fails to decode is dropped here so the error never escapes the
//! socket callback path.

use crate::message::{InboundEvent, PositionClosed, StatusPush};
use desk_core::{LogEntry, ProgressUpdate};
use tracing::{debug, warn};

/// Longest frame excerpt included in a decode warning.
const FRAME_EXCERPT_LEN: usize = 256;

/// Targets of routed events.
pub trait FrameSink {
    fn append_log(&mut self, entry: LogEntry);
    fn status_changed(&mut self, status: StatusPush);
    fn progress_updated(&mut self, update: ProgressUpdate);
    fn position_closed(&mut self, patch: PositionClosed);
    fn refresh_positions(&mut self);
}

/// What happened to a routed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to the sink, with the frame tag.
    Dispatched(&'static str),
    /// Liveness reply, dropped.
    Liveness,
    /// Unknown tag, ignored.
    Ignored(String),
    /// Could not be decoded, dropped.
    Malformed(String),
}

impl RouteOutcome {
    /// Label for metrics.
    pub fn label(&self) -> &str {
        match self {
            Self::Dispatched(tag) => tag,
            Self::Liveness => "pong",
            Self::Ignored(_) => "unknown",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Frame router with simple counters.
#[derive(Debug, Default)]
pub struct EventRouter {
    dispatched: u64,
    dropped: u64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `text` and dispatch it to `sink`.
    pub fn route(&mut self, text: &str, sink: &mut dyn FrameSink) -> RouteOutcome {
        let event = match InboundEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                self.dropped += 1;
                warn!(error = %e, frame = %excerpt(text), "Dropping malformed frame");
                return RouteOutcome::Malformed(e.to_string());
            }
        };

        let tag = match event {
            InboundEvent::Pong => return RouteOutcome::Liveness,
            InboundEvent::Unknown(tag) => {
                debug!(%tag, "Ignoring frame with unknown tag");
                return RouteOutcome::Ignored(tag);
            }
            InboundEvent::Log(entry) => {
                sink.append_log(entry);
                "log"
            }
            InboundEvent::Status(status) => {
                sink.status_changed(status);
                "status"
            }
            InboundEvent::Progress(update) => {
                sink.progress_updated(update);
                "progress_update"
            }
            InboundEvent::PositionClosed(patch) => {
                sink.position_closed(patch);
                "position_closed"
            }
            InboundEvent::RefreshPositions => {
                sink.refresh_positions();
                "refresh_positions"
            }
        };

        self.dispatched += 1;
        RouteOutcome::Dispatched(tag)
    }

    /// Frames delivered to a sink so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Frames dropped as malformed so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(FRAME_EXCERPT_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
