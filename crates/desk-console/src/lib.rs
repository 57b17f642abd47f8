//! Operator console for the trading engine.
//!
//! Wires every component into one process:
//! - Engine link and event routing (desk-ws)
//! - Status, progress, position and log mirrors (desk-state)
//! - Task dispatch with optimistic state
//! - Settings synchronization (desk-settings)
//! - Operator command line on stdin

pub mod commands;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod runtime;
pub mod view;

pub use commands::{Command, CommandError};
pub use config::AppConfig;
pub use console::{Console, ConsoleOptions, Flow, Input};
pub use dispatcher::{CloseSide, DispatchError, TaskDispatcher};
pub use error::{AppError, AppResult};
pub use runtime::{run, TokioScheduler};
