//! Core domain types for the desk operator console.
//!
//! This crate provides the types shared by every part of the console:
//! - `StatusSnapshot`, `ProgressSnapshot`: run state and task progress mirrors
//! - `Position`, `PositionSide`: open positions as reported by the engine
//! - `LogEntry`, `LogLevel`: operator-facing log lines
//! - `TaskSubmission`: an outbound task launch correlated by request id
//! - `Scheduler`, `Timer`: the timer abstraction all timed effects go through

pub mod error;
pub mod scheduler;
pub mod task;
pub mod types;

pub use error::{CoreError, Result};
pub use scheduler::{ManualScheduler, Scheduler, Timer};
pub use task::{new_request_id, TaskSubmission};
pub use types::{
    ConnectionState, LogEntry, LogLevel, Position, PositionSide, ProgressSnapshot,
    ProgressUpdate, Severity, StatusSnapshot,
};
