//! Settings synchronizer.
//!
//! Keeps the in-memory [`ConfigSnapshot`] and persists it through the request
//! layer. Every mutation arms the `SettingsSave` timer for the debounce window;
//! re-arming supersedes, so a burst of edits ends in a single save of the
//! latest state. Nothing is saved until a load has succeeded.

use crate::error::{SettingsError, SettingsResult};
use crate::snapshot::ConfigSnapshot;
use desk_api::{ApiResult, RemoteSettings, RequestLayer};
use desk_core::{LogEntry, Scheduler, Timer};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default debounce window between the last edit and the save.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1_000);

/// Where the synchronizer is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Never loaded, or the last load failed. Saves are suppressed.
    Unloaded,
    /// A load is in flight. Saves are suppressed.
    Loading,
    /// Loaded; edits are persisted.
    Ready,
}

/// Coin pools offered by the engine alongside the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinPools {
    pub all: Vec<String>,
    pub long: Vec<String>,
    pub short: Vec<String>,
}

#[derive(Debug)]
pub struct SettingsSynchronizer {
    snapshot: ConfigSnapshot,
    pools: CoinPools,
    phase: LoadPhase,
    debounce: Duration,
    saves_sent: u64,
}

impl Default for SettingsSynchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl SettingsSynchronizer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            snapshot: ConfigSnapshot::default(),
            pools: CoinPools::default(),
            phase: LoadPhase::Unloaded,
            debounce,
            saves_sent: 0,
        }
    }

    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    pub fn pools(&self) -> &CoinPools {
        &self.pools
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn is_loaded(&self) -> bool {
        self.phase == LoadPhase::Ready
    }

    /// Number of saves handed to the request layer.
    pub fn saves_sent(&self) -> u64 {
        self.saves_sent
    }

    /// Start a load. Any pending save is dropped: the loaded copy replaces it.
    pub fn fetch(&mut self, api: &dyn RequestLayer, sched: &mut dyn Scheduler) {
        sched.cancel(Timer::SettingsSave);
        self.phase = LoadPhase::Loading;
        api.fetch_settings();
    }

    /// Apply a load result. Returns a log entry for the operator on failure.
    pub fn on_loaded(&mut self, result: ApiResult<RemoteSettings>) -> Option<LogEntry> {
        let remote = match result {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "Settings load failed, keeping current snapshot");
                self.phase = LoadPhase::Unloaded;
                return Some(LogEntry::error(
                    "Failed to load settings, check the engine service.",
                ));
            }
        };

        match ConfigSnapshot::merged(&remote.user_settings) {
            Ok(snapshot) => {
                self.snapshot = snapshot;
                self.pools = CoinPools {
                    all: remote.available_coins,
                    long: remote.available_long_coins,
                    short: remote.available_short_coins,
                };
                self.phase = LoadPhase::Ready;
                info!(
                    fields = remote.user_settings.len(),
                    coins = self.pools.all.len(),
                    "Settings loaded"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Settings merge failed, keeping current snapshot");
                self.phase = LoadPhase::Unloaded;
                Some(LogEntry::error(format!("Failed to read settings: {e}")))
            }
        }
    }

    /// Mutate the snapshot and arm the debounced save. Returns whether a save
    /// was armed; edits made before a successful load stay local.
    pub fn update<F>(&mut self, edit: F, sched: &mut dyn Scheduler) -> bool
    where
        F: FnOnce(&mut ConfigSnapshot),
    {
        edit(&mut self.snapshot);
        if self.phase != LoadPhase::Ready {
            debug!(phase = ?self.phase, "Settings edited before load, save suppressed");
            return false;
        }
        sched.schedule(Timer::SettingsSave, self.debounce);
        true
    }

    /// Replace the long/short coin pools selected for trading.
    pub fn set_coin_lists(
        &mut self,
        long: Vec<String>,
        short: Vec<String>,
        sched: &mut dyn Scheduler,
    ) -> bool {
        self.update(
            |s| {
                s.long_coin_list = long;
                s.short_coin_list = short;
            },
            sched,
        )
    }

    /// Send the complete snapshot now.
    pub fn save_now(&mut self, api: &dyn RequestLayer, sched: &mut dyn Scheduler) -> SettingsResult<()> {
        sched.cancel(Timer::SettingsSave);
        if self.phase != LoadPhase::Ready {
            return Err(SettingsError::NotLoaded);
        }
        let body = self.snapshot.to_map()?;
        self.saves_sent += 1;
        debug!(saves_sent = self.saves_sent, "Saving settings");
        api.save_settings(body);
        Ok(())
    }

    /// Handle an expired timer. Timers owned by other components are ignored.
    pub fn on_timer(
        &mut self,
        api: &dyn RequestLayer,
        sched: &mut dyn Scheduler,
        timer: Timer,
    ) -> SettingsResult<()> {
        if timer != Timer::SettingsSave {
            return Ok(());
        }
        self.save_now(api, sched)
    }

    /// Save result, as an operator log entry. Failures are not retried; the
    /// next edit saves again.
    pub fn on_saved(&mut self, result: ApiResult<()>) -> LogEntry {
        match result {
            Ok(()) => LogEntry::success("Settings saved."),
            Err(e) => {
                warn!(error = %e, "Settings save failed");
                LogEntry::error(format!("Failed to save settings: {e}"))
            }
        }
    }
}
