//! Plain-text rendering of the mirrors for the operator terminal.

use desk_core::{ConnectionState, LogEntry, PositionSide, ProgressSnapshot, StatusSnapshot};
use desk_state::{Mirrors, PositionMirror};
use std::fmt::Write;

const BAR_WIDTH: usize = 30;

/// Status line, progress bar and link state.
pub fn status(mirrors: &Mirrors, link: ConnectionState) -> String {
    let mut out = String::new();
    let snapshot: &StatusSnapshot = mirrors.status.snapshot();
    let _ = writeln!(
        out,
        "[{}] {} (running: {}, stopping: {}, link: {link})",
        mirrors.status.severity(),
        snapshot.message,
        snapshot.is_running,
        snapshot.is_stopping,
    );
    if let Some(line) = progress(mirrors.progress.snapshot()) {
        let _ = writeln!(out, "{line}");
    }
    out
}

/// Progress bar, `None` when hidden.
pub fn progress(snapshot: &ProgressSnapshot) -> Option<String> {
    if !snapshot.visible {
        return None;
    }
    let fraction = snapshot.fraction().unwrap_or(0.0);
    let filled = ((fraction * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    Some(format!(
        "{} [{}{}] {}/{} ok, {} failed{}",
        snapshot.task_name,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        snapshot.success_count,
        snapshot.total,
        snapshot.failed_count,
        if snapshot.is_final { " (done)" } else { "" },
    ))
}

/// Position table with per-side totals.
pub fn positions(mirror: &PositionMirror) -> String {
    let mut out = String::new();
    if mirror.is_loading() {
        let _ = writeln!(out, "(loading)");
    }
    if mirror.is_empty() {
        let _ = writeln!(out, "No open positions.");
        return out;
    }

    let _ = writeln!(
        out,
        "  {:<20} {:<6} {:>14} {:>14} {:>12} {:>8}",
        "symbol", "side", "contracts", "notional", "pnl", "pnl%"
    );
    for position in mirror.positions() {
        let marker = if mirror.is_selected(&position.full_symbol) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(
            out,
            "{marker} {:<20} {:<6} {:>14} {:>14} {:>12} {:>8}",
            position.full_symbol,
            position.side.as_str(),
            position.contracts.round_dp(6),
            position.notional.round_dp(2),
            position.pnl.round_dp(2),
            position.pnl_percentage.round_dp(2),
        );
    }
    for side in [PositionSide::Long, PositionSide::Short] {
        let _ = writeln!(
            out,
            "{side}: {} positions, notional {}, pnl {}",
            mirror.by_side(side).count(),
            mirror.notional(side).round_dp(2),
            mirror.pnl(side).round_dp(2),
        );
    }
    let _ = writeln!(out, "total pnl {}", mirror.total_pnl().round_dp(2));
    out
}

/// Latest `limit` log entries, newest first.
pub fn log<'a>(entries: impl Iterator<Item = &'a LogEntry>, limit: usize) -> String {
    let mut out = String::new();
    for entry in entries.take(limit) {
        let _ = writeln!(out, "{} [{}] {}", entry.timestamp, entry.level, entry.message);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::Position;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hidden_progress_renders_nothing() {
        assert!(progress(&ProgressSnapshot::default()).is_none());
    }

    #[test]
    fn test_progress_bar() {
        let mut snapshot = ProgressSnapshot::seeded("Open positions", 4);
        snapshot.success_count = 2;
        let line = progress(&snapshot).unwrap();
        assert!(line.starts_with("Open positions ["));
        assert!(line.contains("2/4 ok"));
        assert_eq!(line.matches('#').count(), BAR_WIDTH / 2);
    }

    #[test]
    fn test_positions_table_marks_selection() {
        let mut mirror = PositionMirror::new();
        mirror.replace_all(vec![Position {
            symbol: "BTC".to_string(),
            full_symbol: "BTC/USDT:USDT".to_string(),
            side: PositionSide::Long,
            contracts: dec!(0.5),
            notional: dec!(30000),
            pnl: dec!(12.5),
            pnl_percentage: dec!(0.04),
            entry_price: dec!(60000),
            mark_price: dec!(60025),
        }]);
        mirror.select("BTC/USDT:USDT");
        let table = positions(&mirror);
        assert!(table.contains("* BTC/USDT:USDT"));
        assert!(table.contains("long: 1 positions"));
        assert!(table.contains("total pnl 12.5"));
    }

    #[test]
    fn test_log_limit() {
        let entries = [
            LogEntry::info("one"),
            LogEntry::warning("two"),
            LogEntry::error("three"),
        ];
        let text = log(entries.iter(), 2);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("[warning] two"));
    }
}
