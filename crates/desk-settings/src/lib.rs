//! Engine settings mirror for the desk console.
//!
//! - [`ConfigSnapshot`]: complete, defaulted settings structure
//! - [`SettingsSynchronizer`]: merge-on-load and debounced save

pub mod error;
pub mod snapshot;
pub mod sync;

pub use error::{SettingsError, SettingsResult};
pub use snapshot::ConfigSnapshot;
pub use sync::{CoinPools, LoadPhase, SettingsSynchronizer, DEFAULT_DEBOUNCE};
