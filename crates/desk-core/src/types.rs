//! Domain types mirrored from the trading engine.

use crate::error::CoreError;
use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Connection
// ============================================================================

/// Lifecycle state of the persistent engine link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

impl ConnectionState {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log
// ============================================================================

/// Severity of an operator-facing log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Normal,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(CoreError::InvalidLogLevel(other.to_string())),
        }
    }
}

/// A log line, either pushed by the engine or produced locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
    /// Wall-clock time as shown to the operator (`HH:MM:SS`).
    #[serde(default)]
    pub timestamp: String,
}

impl LogEntry {
    /// Create a local entry stamped with the current local time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Run/stop state of the engine as seen by the console.
///
/// `is_stopping` is only ever true while `is_running` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub message: String,
    pub is_running: bool,
    pub is_stopping: bool,
}

/// Display severity derived from a [`StatusSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Alert,
    Warning,
    Success,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Warning => "warning",
            Self::Success => "success",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress payload pushed by the engine while a batch task runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(alias = "successCount")]
    pub success_count: u64,
    #[serde(alias = "failedCount")]
    pub failed_count: u64,
    pub total: u64,
    #[serde(default, alias = "taskName")]
    pub task_name: String,
    #[serde(default, alias = "isFinal")]
    pub is_final: bool,
}

/// Last known progress of a long-running task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProgressSnapshot {
    pub success_count: u64,
    pub failed_count: u64,
    pub total: u64,
    pub task_name: String,
    pub visible: bool,
    pub is_final: bool,
}

impl ProgressSnapshot {
    /// Visible snapshot built from a pushed update.
    pub fn from_update(update: ProgressUpdate) -> Self {
        Self {
            success_count: update.success_count,
            failed_count: update.failed_count,
            total: update.total,
            task_name: update.task_name,
            visible: true,
            is_final: update.is_final,
        }
    }

    /// Fresh visible snapshot for a task that was just submitted.
    pub fn seeded(task_name: impl Into<String>, total: u64) -> Self {
        Self {
            success_count: 0,
            failed_count: 0,
            total,
            task_name: task_name.into(),
            visible: true,
            is_final: false,
        }
    }

    /// Units that have finished, successfully or not.
    pub fn completed(&self) -> u64 {
        self.success_count.saturating_add(self.failed_count)
    }

    /// Completed fraction in `[0, 1]`, `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.completed() as f64 / self.total as f64).min(1.0))
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// An open position as reported by the engine.
///
/// Identity is `full_symbol` (e.g. "BTC/USDT:USDT").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Short display symbol (e.g. "BTC").
    #[serde(default)]
    pub symbol: String,
    #[serde(alias = "fullSymbol")]
    pub full_symbol: String,
    pub side: PositionSide,
    pub contracts: Decimal,
    pub notional: Decimal,
    pub pnl: Decimal,
    #[serde(alias = "pnlPercentage")]
    pub pnl_percentage: Decimal,
    /// Break-even price.
    #[serde(alias = "entryPrice")]
    pub entry_price: Decimal,
    #[serde(alias = "markPrice")]
    pub mark_price: Decimal,
}

impl Position {
    /// Scale size fields by `factor`. PnL and prices are left as reported.
    /// On overflow nothing is changed.
    pub fn scale_size(&mut self, factor: Decimal) -> crate::Result<()> {
        let overflow = || CoreError::ScaleOverflow {
            full_symbol: self.full_symbol.clone(),
            factor: factor.to_string(),
        };
        let contracts = self.contracts.checked_mul(factor).ok_or_else(overflow)?;
        let notional = self.notional.checked_mul(factor).ok_or_else(overflow)?;
        self.contracts = contracts;
        self.notional = notional;
        Ok(())
    }
}
