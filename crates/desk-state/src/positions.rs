//! Local mirror of the engine's open positions.
//!
//! Refreshed by full pull ([`PositionMirror::replace_all`]) and patched by
//! pushed close events ([`PositionMirror::apply_close`]). A partial close only
//! rescales size fields; PnL and prices stay stale until the next full pull.

use desk_core::{Position, PositionSide};
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Ratios this close to 1 are full closes (1e-9).
pub const FULL_CLOSE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// How many applied close event ids are remembered for deduplication.
const RECENT_EVENT_CAPACITY: usize = 256;

/// Result of a close patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Position removed.
    Removed,
    /// Size fields scaled by `1 - ratio`.
    Scaled,
    /// No position with that key.
    Unknown,
    /// Event id already applied.
    Duplicate,
    /// Ratio outside `(0, 1]`; the event is dropped.
    Invalid,
}

impl CloseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::Scaled => "scaled",
            Self::Unknown => "unknown",
            Self::Duplicate => "duplicate",
            Self::Invalid => "invalid",
        }
    }
}

/// Position mirror with operator selection.
#[derive(Debug, Default)]
pub struct PositionMirror {
    positions: Vec<Position>,
    selection: HashSet<String>,
    loading: bool,
    recent_events: VecDeque<String>,
}

impl PositionMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn get(&self, full_symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.full_symbol == full_symbol)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// A full pull was issued.
    pub fn begin_fetch(&mut self) {
        self.loading = true;
    }

    /// A full pull failed; the current set is kept.
    pub fn fetch_failed(&mut self) {
        self.loading = false;
    }

    /// Replace the whole set with a full pull result. Clears the selection.
    pub fn replace_all(&mut self, positions: Vec<Position>) {
        self.positions = positions;
        self.selection.clear();
        self.loading = false;
        debug!(count = self.positions.len(), "Positions replaced");
    }

    /// Apply a pushed close of `ratio` of `full_symbol`.
    ///
    /// Without an `event_id` the patch is not idempotent: a redelivered event
    /// scales the position again.
    pub fn apply_close(
        &mut self,
        full_symbol: &str,
        ratio: Decimal,
        event_id: Option<&str>,
    ) -> CloseOutcome {
        if ratio <= Decimal::ZERO || ratio >= Decimal::ONE + FULL_CLOSE_EPSILON {
            warn!(full_symbol, %ratio, "Dropping close event with ratio outside (0, 1]");
            return CloseOutcome::Invalid;
        }

        if let Some(id) = event_id {
            if self.recent_events.iter().any(|seen| seen == id) {
                debug!(full_symbol, event_id = id, "Skipping redelivered close event");
                return CloseOutcome::Duplicate;
            }
        }

        let Some(idx) = self.positions.iter().position(|p| p.full_symbol == full_symbol) else {
            warn!(full_symbol, %ratio, "Close event for unknown position");
            return CloseOutcome::Unknown;
        };

        if let Some(id) = event_id {
            if self.recent_events.len() == RECENT_EVENT_CAPACITY {
                self.recent_events.pop_front();
            }
            self.recent_events.push_back(id.to_string());
        }

        if (ratio - Decimal::ONE).abs() < FULL_CLOSE_EPSILON {
            self.positions.remove(idx);
            self.selection.remove(full_symbol);
            debug!(full_symbol, "Position fully closed");
            CloseOutcome::Removed
        } else {
            match self.positions[idx].scale_size(Decimal::ONE - ratio) {
                Ok(()) => {
                    debug!(full_symbol, %ratio, "Position partially closed");
                    CloseOutcome::Scaled
                }
                Err(e) => {
                    warn!(error = %e, "Dropping close event");
                    CloseOutcome::Invalid
                }
            }
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select a position. Returns false when no such position exists.
    pub fn select(&mut self, full_symbol: &str) -> bool {
        if self.get(full_symbol).is_none() {
            return false;
        }
        self.selection.insert(full_symbol.to_string());
        true
    }

    pub fn deselect(&mut self, full_symbol: &str) -> bool {
        self.selection.remove(full_symbol)
    }

    /// Flip selection. Returns the new selected state.
    pub fn toggle(&mut self, full_symbol: &str) -> bool {
        if self.deselect(full_symbol) {
            false
        } else {
            self.select(full_symbol)
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, full_symbol: &str) -> bool {
        self.selection.contains(full_symbol)
    }

    /// Selected keys in position order.
    pub fn selected(&self) -> Vec<String> {
        self.positions
            .iter()
            .filter(|p| self.selection.contains(&p.full_symbol))
            .map(|p| p.full_symbol.clone())
            .collect()
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    pub fn by_side(&self, side: PositionSide) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(move |p| p.side == side)
    }

    pub fn long_positions(&self) -> Vec<&Position> {
        self.by_side(PositionSide::Long).collect()
    }

    pub fn short_positions(&self) -> Vec<&Position> {
        self.by_side(PositionSide::Short).collect()
    }

    pub fn pnl(&self, side: PositionSide) -> Decimal {
        self.by_side(side).map(|p| p.pnl).sum()
    }

    pub fn notional(&self, side: PositionSide) -> Decimal {
        self.by_side(side).map(|p| p.notional).sum()
    }

    pub fn total_pnl(&self) -> Decimal {
        self.pnl(PositionSide::Long) + self.pnl(PositionSide::Short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(full_symbol: &str, side: PositionSide, contracts: Decimal, notional: Decimal) -> Position {
        Position {
            symbol: full_symbol.split('/').next().unwrap_or_default().to_string(),
            full_symbol: full_symbol.to_string(),
            side,
            contracts,
            notional,
            pnl: dec!(10),
            pnl_percentage: dec!(1),
            entry_price: dec!(100),
            mark_price: dec!(101),
        }
    }

    fn mirror() -> PositionMirror {
        let mut mirror = PositionMirror::new();
        mirror.replace_all(vec![
            position("BTC/USDT:USDT", PositionSide::Long, dec!(10), dec!(1000)),
            position("ETH/USDT:USDT", PositionSide::Long, dec!(5), dec!(500)),
            position("SOL/USDT:USDT", PositionSide::Short, dec!(20), dec!(300)),
        ]);
        mirror
    }

    #[test]
    fn test_partial_close_scales_size() {
        let mut mirror = mirror();
        assert_eq!(
            mirror.apply_close("BTC/USDT:USDT", dec!(0.3), None),
            CloseOutcome::Scaled
        );
        let btc = mirror.get("BTC/USDT:USDT").unwrap();
        assert_eq!(btc.contracts, dec!(7));
        assert_eq!(btc.notional, dec!(700));
        assert_eq!(btc.pnl, dec!(10));
        assert_eq!(btc.mark_price, dec!(101));
    }

    #[test]
    fn test_near_one_ratio_removes_position() {
        let mut mirror = mirror();
        mirror.select("BTC/USDT:USDT");
        assert_eq!(
            mirror.apply_close("BTC/USDT:USDT", dec!(0.9999999999), None),
            CloseOutcome::Removed
        );
        assert!(mirror.get("BTC/USDT:USDT").is_none());
        assert!(!mirror.is_selected("BTC/USDT:USDT"));
    }

    #[test]
    fn test_ratio_outside_epsilon_is_partial() {
        let mut mirror = mirror();
        assert_eq!(
            mirror.apply_close("BTC/USDT:USDT", dec!(0.999999998), None),
            CloseOutcome::Scaled
        );
    }

    #[test]
    fn test_redelivery_without_event_id_compounds() {
        let mut mirror = mirror();
        mirror.apply_close("BTC/USDT:USDT", dec!(0.5), None);
        mirror.apply_close("BTC/USDT:USDT", dec!(0.5), None);
        assert_eq!(mirror.get("BTC/USDT:USDT").unwrap().contracts, dec!(2.5));
    }

    #[test]
    fn test_redelivery_with_event_id_is_skipped() {
        let mut mirror = mirror();
        mirror.apply_close("BTC/USDT:USDT", dec!(0.5), Some("evt-1"));
        assert_eq!(
            mirror.apply_close("BTC/USDT:USDT", dec!(0.5), Some("evt-1")),
            CloseOutcome::Duplicate
        );
        assert_eq!(mirror.get("BTC/USDT:USDT").unwrap().contracts, dec!(5));
    }

    #[test]
    fn test_out_of_range_ratio_is_dropped() {
        let mut mirror = mirror();
        for ratio in [
            dec!(0),
            dec!(-0.5),
            dec!(1.5),
            dec!(-10000000000000000000000000000),
            Decimal::MAX,
            Decimal::MIN,
        ] {
            assert_eq!(
                mirror.apply_close("BTC/USDT:USDT", ratio, Some("evt-bad")),
                CloseOutcome::Invalid
            );
        }
        let btc = mirror.get("BTC/USDT:USDT").unwrap();
        assert_eq!(btc.contracts, dec!(10));
        assert_eq!(btc.notional, dec!(1000));

        // A rejected event does not burn its id.
        assert_eq!(
            mirror.apply_close("BTC/USDT:USDT", dec!(0.5), Some("evt-bad")),
            CloseOutcome::Scaled
        );
    }

    #[test]
    fn test_ratio_just_above_one_is_full_close() {
        let mut mirror = mirror();
        assert_eq!(
            mirror.apply_close("BTC/USDT:USDT", dec!(1.0000000001), None),
            CloseOutcome::Removed
        );
    }

    #[test]
    fn test_unknown_symbol() {
        let mut mirror = mirror();
        assert_eq!(mirror.apply_close("DOGE/USDT:USDT", dec!(1), None), CloseOutcome::Unknown);
        assert_eq!(mirror.len(), 3);
    }

    #[test]
    fn test_replace_all_clears_selection() {
        let mut mirror = mirror();
        assert!(mirror.select("SOL/USDT:USDT"));
        assert!(!mirror.select("DOGE/USDT:USDT"));
        mirror.begin_fetch();
        assert!(mirror.is_loading());

        mirror.replace_all(vec![position("SOL/USDT:USDT", PositionSide::Short, dec!(1), dec!(15))]);
        assert!(!mirror.is_loading());
        assert!(mirror.selected().is_empty());
    }

    #[test]
    fn test_toggle_selection() {
        let mut mirror = mirror();
        assert!(mirror.toggle("ETH/USDT:USDT"));
        assert!(mirror.toggle("BTC/USDT:USDT"));
        assert_eq!(mirror.selected(), vec!["BTC/USDT:USDT", "ETH/USDT:USDT"]);
        assert!(!mirror.toggle("ETH/USDT:USDT"));
        assert_eq!(mirror.selected(), vec!["BTC/USDT:USDT"]);
    }

    #[test]
    fn test_aggregates() {
        let mut mirror = mirror();
        mirror.apply_close("ETH/USDT:USDT", dec!(0.2), None);

        assert_eq!(mirror.long_positions().len(), 2);
        assert_eq!(mirror.short_positions().len(), 1);
        assert_eq!(mirror.pnl(PositionSide::Long), dec!(20));
        assert_eq!(mirror.pnl(PositionSide::Short), dec!(10));
        assert_eq!(mirror.total_pnl(), dec!(30));
        assert_eq!(mirror.notional(PositionSide::Long), dec!(1400));
        assert_eq!(mirror.notional(PositionSide::Short), dec!(300));
    }
}
