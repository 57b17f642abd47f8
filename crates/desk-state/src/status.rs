//! Run/stop status mirror.

use desk_core::{Severity, StatusSnapshot};
use tracing::{debug, info};

/// Shown after a successful load, before any task has been launched.
pub const READY: &str = "Ready";
/// Shown while the engine link is down.
pub const DISCONNECTED: &str = "Disconnected";
/// Shown when the link comes up and nothing is running.
pub const CONNECTED: &str = "Connected";
/// Shown between a local stop request and the engine's confirmation.
pub const STOPPING: &str = "Stopping...";
/// Shown between a task launch and its first progress push.
pub const SUBMITTING: &str = "Submitting task...";
/// Shown when a task launch call failed.
pub const SUBMISSION_FAILED: &str = "Task submission failed";
/// Shown when a stop request did not reach the engine.
pub const STOP_FAILED: &str = "Stop request failed";

/// Messages read as "ready" for severity. The engine pushes its own
/// localized text, so its form is accepted next to the console's.
pub const READY_ALIASES: &[&str] = &[READY, "准备就绪"];
/// Messages read as "disconnected" for severity.
pub const DISCONNECTED_ALIASES: &[&str] = &[DISCONNECTED, "已断开"];

/// Result of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StatusChange {
    /// Running flag untouched or still set.
    Unchanged,
    /// `running` was provided as false: the run is over as far as the
    /// console is concerned, and progress display must be wound down.
    RunEnded,
}

/// Status tracker.
///
/// `is_stopping` is only ever set while `is_running` is set, and clearing
/// `is_running` always clears it.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    snapshot: StatusSnapshot,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self {
            snapshot: StatusSnapshot {
                message: READY.to_string(),
                is_running: false,
                is_stopping: false,
            },
        }
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    pub fn message(&self) -> &str {
        &self.snapshot.message
    }

    pub fn is_running(&self) -> bool {
        self.snapshot.is_running
    }

    pub fn is_stopping(&self) -> bool {
        self.snapshot.is_stopping
    }

    /// Update the message and, when given, the running flag.
    pub fn set_status(&mut self, message: impl Into<String>, running: Option<bool>) -> StatusChange {
        self.snapshot.message = message.into();
        match running {
            Some(true) => {
                self.snapshot.is_running = true;
                StatusChange::Unchanged
            }
            Some(false) => {
                if self.snapshot.is_running {
                    info!(message = %self.snapshot.message, "Run ended");
                }
                self.snapshot.is_running = false;
                self.snapshot.is_stopping = false;
                StatusChange::RunEnded
            }
            None => StatusChange::Unchanged,
        }
    }

    /// Optimistic local stop. Returns whether the transition happened; it is a
    /// no-op when nothing is running or a stop is already in progress.
    pub fn initiate_stop(&mut self) -> bool {
        if !self.snapshot.is_running || self.snapshot.is_stopping {
            debug!(
                is_running = self.snapshot.is_running,
                is_stopping = self.snapshot.is_stopping,
                "Stop ignored"
            );
            return false;
        }
        self.snapshot.is_stopping = true;
        self.snapshot.message = STOPPING.to_string();
        true
    }

    /// Undo a local stop whose request never reached the engine. The run is
    /// still considered active.
    pub fn abort_stop(&mut self, message: impl Into<String>) -> bool {
        if !self.snapshot.is_stopping {
            return false;
        }
        self.snapshot.is_stopping = false;
        self.snapshot.message = message.into();
        true
    }

    /// Link came up. Shows the connected message unless a run owns the
    /// status line.
    pub fn link_up(&mut self) {
        if !self.snapshot.is_running {
            self.snapshot.message = CONNECTED.to_string();
        }
    }

    /// Link went down. The running flag is left alone; the message is kept
    /// while a stop is in flight.
    pub fn link_down(&mut self) {
        if !self.snapshot.is_stopping {
            self.snapshot.message = DISCONNECTED.to_string();
        }
    }

    /// Derived display severity.
    pub fn severity(&self) -> Severity {
        if self.snapshot.is_stopping {
            Severity::Alert
        } else if self.snapshot.is_running {
            Severity::Warning
        } else if DISCONNECTED_ALIASES.contains(&self.snapshot.message.trim()) {
            Severity::Alert
        } else if READY_ALIASES.contains(&self.snapshot.message.trim()) {
            Severity::Success
        } else {
            Severity::Info
        }
    }
}
