//! Task dispatcher.
//!
//! Launches long-running engine tasks with optimistic local state: the status
//! line and progress bar flip to "submitting" before the call resolves, and
//! revert only when the submission itself fails. Progress after that comes
//! from engine pushes.

use desk_api::{
    Ack, ApiResult, RequestLayer, CLOSE_BY_SIDE_PATH, CLOSE_MULTIPLE_PATH, CLOSE_POSITION_PATH,
    START_TRADING_PATH, SYNC_SLTP_PATH,
};
use desk_core::{CoreError, LogEntry, PositionSide, Scheduler, TaskSubmission};
use desk_settings::ConfigSnapshot;
use desk_state::{status, Mirrors};
use desk_telemetry::Metrics;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Warning logged when a launch is attempted while a task runs.
pub const BUSY_WARNING: &str = "A task is already running, please wait for it to finish.";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("A task is already running")]
    AlreadyRunning,

    #[error("Close ratio must be in (0, 1], got {0}")]
    InvalidRatio(Decimal),

    #[error("Nothing selected")]
    EmptySelection,

    #[error("Invalid task payload: {0}")]
    Payload(#[from] CoreError),

    #[error("Settings error: {0}")]
    Settings(#[from] desk_settings::SettingsError),
}

/// Which positions a side close targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSide {
    Long,
    Short,
    All,
}

impl CloseSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::All => "all",
        }
    }

    /// Position side this close is limited to, `None` for both.
    pub fn position_side(&self) -> Option<PositionSide> {
        match self {
            Self::Long => Some(PositionSide::Long),
            Self::Short => Some(PositionSide::Short),
            Self::All => None,
        }
    }
}

impl fmt::Display for CloseSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloseSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            other => PositionSide::from_str(other).map(|side| match side {
                PositionSide::Long => Self::Long,
                PositionSide::Short => Self::Short,
            }),
        }
    }
}

/// A launched task awaiting its submission reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingTask {
    task_name: String,
    endpoint: String,
}

/// Task dispatcher.
#[derive(Debug, Default)]
pub struct TaskDispatcher {
    pending: HashMap<String, PendingTask>,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions not yet answered.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Launch a task. Returns the request id attached to the payload.
    ///
    /// While a task is running nothing is sent: exactly one warning entry is
    /// logged and [`DispatchError::AlreadyRunning`] returned.
    #[allow(clippy::too_many_arguments)]
    pub fn launch(
        &mut self,
        endpoint: &str,
        payload: Value,
        task_name: &str,
        total_units: u64,
        mirrors: &mut Mirrors,
        api: &dyn RequestLayer,
        sched: &mut dyn Scheduler,
    ) -> Result<String, DispatchError> {
        if mirrors.status.is_running() {
            warn!(endpoint, task_name, "Launch rejected, a task is running");
            mirrors.log.push(LogEntry::warning(BUSY_WARNING));
            Metrics::task_submission("rejected");
            return Err(DispatchError::AlreadyRunning);
        }

        let submission = TaskSubmission::new(endpoint, payload, task_name, total_units)?;
        let request_id = submission.request_id.clone();

        mirrors.set_status(status::SUBMITTING, Some(true), sched);
        mirrors.progress.seed(task_name, total_units, sched);
        self.pending.insert(
            request_id.clone(),
            PendingTask {
                task_name: task_name.to_string(),
                endpoint: endpoint.to_string(),
            },
        );

        info!(%request_id, endpoint, task_name, total_units, "Submitting task");
        Metrics::task_submission("submitted");
        api.submit_task(submission);
        Ok(request_id)
    }

    /// Apply a submission reply. Failure reverts the optimistic state; success
    /// leaves it for engine pushes to overwrite.
    pub fn on_submitted(
        &mut self,
        request_id: &str,
        result: ApiResult<Ack>,
        mirrors: &mut Mirrors,
        sched: &mut dyn Scheduler,
    ) {
        let Some(task) = self.pending.remove(request_id) else {
            warn!(%request_id, "Reply for unknown submission");
            return;
        };

        match result {
            Ok(ack) => {
                Metrics::task_submission("accepted");
                info!(
                    %request_id,
                    task = %task.task_name,
                    message = ack.message.as_deref().unwrap_or(""),
                    "Task accepted"
                );
            }
            Err(e) => {
                Metrics::task_submission("failed");
                warn!(%request_id, endpoint = %task.endpoint, error = %e, "Task submission failed");
                mirrors.set_status(status::SUBMISSION_FAILED, Some(false), sched);
                mirrors.log.push(LogEntry::error(format!(
                    "Failed to start {}: {e}",
                    task.task_name
                )));
            }
        }
    }

    // ========================================================================
    // Engine tasks
    // ========================================================================

    /// Open positions for every enabled side of the current settings.
    pub fn open_positions(
        &mut self,
        settings: &ConfigSnapshot,
        mirrors: &mut Mirrors,
        api: &dyn RequestLayer,
        sched: &mut dyn Scheduler,
    ) -> Result<String, DispatchError> {
        let mut total = 0;
        if settings.enable_long_trades {
            total += settings.long_coin_list.len();
        }
        if settings.enable_short_trades {
            total += settings.short_coin_list.len();
        }
        let payload = Value::Object(settings.to_map()?);
        self.launch(
            START_TRADING_PATH,
            payload,
            "Open positions",
            total as u64,
            mirrors,
            api,
            sched,
        )
    }

    /// Re-place stop-loss/take-profit orders for all open positions.
    pub fn sync_sltp(
        &mut self,
        settings: &ConfigSnapshot,
        mirrors: &mut Mirrors,
        api: &dyn RequestLayer,
        sched: &mut dyn Scheduler,
    ) -> Result<String, DispatchError> {
        let total = mirrors.positions.len() as u64;
        let payload = Value::Object(settings.to_map()?);
        self.launch(SYNC_SLTP_PATH, payload, "Sync SL/TP", total, mirrors, api, sched)
    }

    pub fn close_position(
        &mut self,
        full_symbol: &str,
        ratio: Decimal,
        mirrors: &mut Mirrors,
        api: &dyn RequestLayer,
        sched: &mut dyn Scheduler,
    ) -> Result<String, DispatchError> {
        let ratio = ratio_value(ratio)?;
        let payload = json!({ "full_symbol": full_symbol, "ratio": ratio });
        self.launch(
            CLOSE_POSITION_PATH,
            payload,
            &format!("Close {full_symbol}"),
            1,
            mirrors,
            api,
            sched,
        )
    }

    pub fn close_by_side(
        &mut self,
        side: CloseSide,
        ratio: Decimal,
        mirrors: &mut Mirrors,
        api: &dyn RequestLayer,
        sched: &mut dyn Scheduler,
    ) -> Result<String, DispatchError> {
        let ratio = ratio_value(ratio)?;
        let total = match side.position_side() {
            Some(side) => mirrors.positions.by_side(side).count(),
            None => mirrors.positions.len(),
        };
        let payload = json!({ "side": side.as_str(), "ratio": ratio });
        self.launch(
            CLOSE_BY_SIDE_PATH,
            payload,
            &format!("Close {side} positions"),
            total as u64,
            mirrors,
            api,
            sched,
        )
    }

    /// Close the current selection.
    pub fn close_selected(
        &mut self,
        ratio: Decimal,
        mirrors: &mut Mirrors,
        api: &dyn RequestLayer,
        sched: &mut dyn Scheduler,
    ) -> Result<String, DispatchError> {
        let ratio = ratio_value(ratio)?;
        let symbols = mirrors.positions.selected();
        if symbols.is_empty() {
            return Err(DispatchError::EmptySelection);
        }
        let total = symbols.len() as u64;
        let payload = json!({ "full_symbols": symbols, "ratio": ratio });
        self.launch(
            CLOSE_MULTIPLE_PATH,
            payload,
            "Close selected positions",
            total,
            mirrors,
            api,
            sched,
        )
    }

    /// Optimistic stop; the request is only sent when the local transition
    /// happened.
    pub fn stop(&mut self, mirrors: &mut Mirrors, api: &dyn RequestLayer) -> bool {
        if !mirrors.status.initiate_stop() {
            return false;
        }
        info!("Requesting stop");
        api.request_stop();
        true
    }

    /// Stop reply. A failed request gives the status line back to the run.
    pub fn on_stop_requested(&mut self, result: ApiResult<Ack>, mirrors: &mut Mirrors) {
        match result {
            Ok(_) => info!("Stop acknowledged"),
            Err(e) => {
                warn!(error = %e, "Stop request failed");
                mirrors.status.abort_stop(status::STOP_FAILED);
                mirrors
                    .log
                    .push(LogEntry::error(format!("Failed to stop the task: {e}")));
            }
        }
    }
}

/// Validate a close ratio and convert it to a JSON number.
fn ratio_value(ratio: Decimal) -> Result<f64, DispatchError> {
    if ratio <= Decimal::ZERO || ratio > Decimal::ONE {
        return Err(DispatchError::InvalidRatio(ratio));
    }
    ratio.to_f64().ok_or(DispatchError::InvalidRatio(ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_api::{ApiCall, ApiError, RecordingRequestLayer};
    use desk_core::{LogLevel, ManualScheduler, Position};
    use rust_decimal_macros::dec;

    fn position(full_symbol: &str, side: PositionSide) -> Position {
        Position {
            symbol: full_symbol.split('/').next().unwrap_or_default().to_string(),
            full_symbol: full_symbol.to_string(),
            side,
            contracts: dec!(1),
            notional: dec!(100),
            pnl: dec!(0),
            pnl_percentage: dec!(0),
            entry_price: dec!(100),
            mark_price: dec!(100),
        }
    }

    #[test]
    fn test_launch_sets_optimistic_state() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();

        let request_id = dispatcher
            .launch(
                START_TRADING_PATH,
                json!({"leverage": 5}),
                "Open positions",
                4,
                &mut mirrors,
                &api,
                &mut sched,
            )
            .unwrap();

        assert!(mirrors.status.is_running());
        assert_eq!(mirrors.status.message(), status::SUBMITTING);
        let progress = mirrors.progress.snapshot();
        assert!(progress.visible);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.completed(), 0);

        let submissions = api.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].request_id, request_id);
        assert_eq!(submissions[0].payload["request_id"], json!(request_id));
        assert_eq!(submissions[0].payload["leverage"], json!(5));
        assert_eq!(dispatcher.pending_count(), 1);
    }

    #[test]
    fn test_launch_while_running_is_rejected_once() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();
        mirrors.set_status("Opening positions", Some(true), &mut sched);

        let result = dispatcher.launch(
            CLOSE_POSITION_PATH,
            json!({}),
            "Close",
            1,
            &mut mirrors,
            &api,
            &mut sched,
        );

        assert!(matches!(result, Err(DispatchError::AlreadyRunning)));
        assert!(api.calls().is_empty());
        assert_eq!(mirrors.log.count_level(LogLevel::Warning), 1);
        assert_eq!(mirrors.log.len(), 1);
        assert_eq!(mirrors.status.message(), "Opening positions");
    }

    #[test]
    fn test_failed_submission_reverts() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();

        let request_id = dispatcher
            .launch(SYNC_SLTP_PATH, json!({}), "Sync SL/TP", 2, &mut mirrors, &api, &mut sched)
            .unwrap();
        dispatcher.on_submitted(
            &request_id,
            Err(ApiError::Status {
                status: 500,
                body: "engine busy".to_string(),
            }),
            &mut mirrors,
            &mut sched,
        );

        assert!(!mirrors.status.is_running());
        assert_eq!(mirrors.status.message(), status::SUBMISSION_FAILED);
        assert!(!mirrors.progress.is_visible());
        assert_eq!(mirrors.log.count_level(LogLevel::Error), 1);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_successful_submission_leaves_state() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();

        let request_id = dispatcher
            .launch(SYNC_SLTP_PATH, json!({}), "Sync SL/TP", 2, &mut mirrors, &api, &mut sched)
            .unwrap();
        let before = mirrors.status.snapshot().clone();
        dispatcher.on_submitted(&request_id, Ok(Ack::default()), &mut mirrors, &mut sched);

        assert_eq!(mirrors.status.snapshot(), &before);
        assert!(mirrors.progress.is_visible());
        assert!(mirrors.log.is_empty());
    }

    #[test]
    fn test_each_launch_gets_a_fresh_request_id() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();

        let first = dispatcher
            .close_position("BTC/USDT:USDT", dec!(1), &mut mirrors, &api, &mut sched)
            .unwrap();
        mirrors.set_status("Done", Some(false), &mut sched);
        let second = dispatcher
            .close_position("BTC/USDT:USDT", dec!(1), &mut mirrors, &api, &mut sched)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_close_payloads() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();
        mirrors.positions.replace_all(vec![
            position("BTC/USDT:USDT", PositionSide::Long),
            position("ETH/USDT:USDT", PositionSide::Long),
            position("SOL/USDT:USDT", PositionSide::Short),
        ]);

        dispatcher
            .close_by_side(CloseSide::Long, dec!(0.5), &mut mirrors, &api, &mut sched)
            .unwrap();
        let submission = &api.submissions()[0];
        assert_eq!(submission.endpoint, CLOSE_BY_SIDE_PATH);
        assert_eq!(submission.payload["side"], json!("long"));
        assert_eq!(submission.payload["ratio"], json!(0.5));
        assert_eq!(submission.total_units, 2);
    }

    #[test]
    fn test_close_selected_uses_selection_order() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();
        mirrors.positions.replace_all(vec![
            position("BTC/USDT:USDT", PositionSide::Long),
            position("SOL/USDT:USDT", PositionSide::Short),
        ]);

        assert!(matches!(
            dispatcher.close_selected(dec!(1), &mut mirrors, &api, &mut sched),
            Err(DispatchError::EmptySelection)
        ));

        mirrors.positions.select("SOL/USDT:USDT");
        mirrors.positions.select("BTC/USDT:USDT");
        dispatcher
            .close_selected(dec!(1), &mut mirrors, &api, &mut sched)
            .unwrap();
        let submission = &api.submissions()[0];
        assert_eq!(
            submission.payload["full_symbols"],
            json!(["BTC/USDT:USDT", "SOL/USDT:USDT"])
        );
        assert_eq!(submission.total_units, 2);
    }

    #[test]
    fn test_ratio_bounds() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();

        for ratio in [dec!(0), dec!(-0.1), dec!(1.01)] {
            assert!(matches!(
                dispatcher.close_position("BTC/USDT:USDT", ratio, &mut mirrors, &api, &mut sched),
                Err(DispatchError::InvalidRatio(_))
            ));
        }
        assert!(api.calls().is_empty());
        assert!(!mirrors.status.is_running());
    }

    #[test]
    fn test_open_positions_counts_enabled_sides() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();
        let settings = ConfigSnapshot {
            enable_short_trades: false,
            ..ConfigSnapshot::default()
        };

        dispatcher
            .open_positions(&settings, &mut mirrors, &api, &mut sched)
            .unwrap();
        let submission = &api.submissions()[0];
        assert_eq!(submission.endpoint, START_TRADING_PATH);
        assert_eq!(submission.total_units, 2);
        assert_eq!(submission.payload["leverage"], json!(20));
    }

    #[test]
    fn test_stop_sends_request_once() {
        let api = RecordingRequestLayer::new();
        let mut sched = ManualScheduler::new();
        let mut mirrors = Mirrors::default();
        let mut dispatcher = TaskDispatcher::new();

        assert!(!dispatcher.stop(&mut mirrors, &api));
        assert!(api.calls().is_empty());

        mirrors.set_status("Working", Some(true), &mut sched);
        assert!(dispatcher.stop(&mut mirrors, &api));
        assert!(!dispatcher.stop(&mut mirrors, &api));
        assert_eq!(api.calls(), vec![ApiCall::RequestStop]);

        dispatcher.on_stop_requested(Err(ApiError::ChannelClosed), &mut mirrors);
        assert!(mirrors.status.is_running());
        assert!(!mirrors.status.is_stopping());
        assert_eq!(mirrors.status.message(), status::STOP_FAILED);
    }

    #[test]
    fn test_close_side_parsing() {
        assert_eq!("ALL".parse::<CloseSide>().unwrap(), CloseSide::All);
        assert_eq!("short".parse::<CloseSide>().unwrap(), CloseSide::Short);
        assert!("both".parse::<CloseSide>().is_err());
    }
}
