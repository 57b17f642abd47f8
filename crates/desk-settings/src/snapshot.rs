//! Engine settings snapshot and its default template.
//!
//! The snapshot is always complete: loading merges the engine's copy over
//! [`ConfigSnapshot::default`] one field at a time, so consumers never see a
//! partial structure.

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// User-editable engine settings.
///
/// Fields the console does not know are carried in `extra` and written back
/// unchanged on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    // Credentials and connectivity
    pub api_key: String,
    pub api_secret: String,
    pub use_testnet: bool,
    pub enable_proxy: bool,
    pub proxy_url: String,

    // Position sizing
    pub leverage: u32,
    pub total_long_position_value: f64,
    pub total_short_position_value: f64,
    pub long_coin_list: Vec<String>,
    pub short_coin_list: Vec<String>,
    pub long_custom_weights: BTreeMap<String, f64>,

    // Trading toggles
    pub enable_long_trades: bool,
    pub enable_short_trades: bool,

    // Stop-loss / take-profit
    pub enable_long_sl_tp: bool,
    pub long_stop_loss_percentage: f64,
    pub long_take_profit_percentage: f64,
    pub enable_short_sl_tp: bool,
    pub short_stop_loss_percentage: f64,
    pub short_take_profit_percentage: f64,

    // Order execution
    pub open_maker_retries: u32,
    pub open_order_fill_timeout_seconds: u32,
    pub close_maker_retries: u32,
    pub close_order_fill_timeout_seconds: u32,

    // Rebalancing
    pub rebalance_method: String,
    pub rebalance_top_n: u32,
    pub rebalance_min_volume_usd: f64,
    pub rebalance_abs_momentum_days: u32,
    pub rebalance_rel_strength_days: u32,
    pub rebalance_foam_days: u32,
    pub rebalance_short_ratio_max: f64,
    pub rebalance_short_ratio_min: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            use_testnet: true,
            enable_proxy: false,
            proxy_url: "http://127.0.0.1:7890".to_string(),
            leverage: 20,
            total_long_position_value: 1000.0,
            total_short_position_value: 500.0,
            long_coin_list: vec!["BTC".to_string(), "ETH".to_string()],
            short_coin_list: vec!["SOL".to_string(), "AVAX".to_string()],
            long_custom_weights: BTreeMap::new(),
            enable_long_trades: true,
            enable_short_trades: true,
            enable_long_sl_tp: true,
            long_stop_loss_percentage: 50.0,
            long_take_profit_percentage: 100.0,
            enable_short_sl_tp: true,
            short_stop_loss_percentage: 80.0,
            short_take_profit_percentage: 150.0,
            open_maker_retries: 5,
            open_order_fill_timeout_seconds: 60,
            close_maker_retries: 3,
            close_order_fill_timeout_seconds: 12,
            rebalance_method: "multi_factor_weakest".to_string(),
            rebalance_top_n: 50,
            rebalance_min_volume_usd: 20_000_000.0,
            rebalance_abs_momentum_days: 30,
            rebalance_rel_strength_days: 60,
            rebalance_foam_days: 1,
            rebalance_short_ratio_max: 0.7,
            rebalance_short_ratio_min: 0.35,
            extra: Map::new(),
        }
    }
}

impl ConfigSnapshot {
    /// Merge `remote` over the default template.
    ///
    /// A known field takes the remote value only when it is present, not
    /// null, not an empty string and of the right type; otherwise the default
    /// stays. Unknown fields are kept verbatim.
    pub fn merged(remote: &Map<String, Value>) -> SettingsResult<Self> {
        let defaults = Self::default();
        let template = match serde_json::to_value(&defaults)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mut merged = template.clone();
        for (key, value) in remote {
            if !template.contains_key(key) {
                merged.insert(key.clone(), value.clone());
                continue;
            }
            if value.is_null() || value.as_str().is_some_and(str::is_empty) {
                continue;
            }
            if !accepts(key, value) {
                warn!(field = %key, value = %value, "Ignoring remote setting of the wrong type");
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }

        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Full snapshot as a JSON object, known fields first.
    pub fn to_map(&self) -> SettingsResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(SettingsError::NotAnObject(other.to_string())),
        }
    }

    /// Copy with a single field set from JSON. Known fields must accept the
    /// value; unknown fields are stored in `extra`.
    pub fn with_field(&self, key: &str, value: Value) -> SettingsResult<Self> {
        let mut map = self.to_map()?;
        let known = serde_json::to_value(Self::default())?
            .as_object()
            .is_some_and(|template| template.contains_key(key));
        if known && !accepts(key, &value) {
            return Err(SettingsError::InvalidField {
                field: key.to_string(),
                value: value.to_string(),
            });
        }
        map.insert(key.to_string(), value);
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Whether `value` deserializes into the known field `key`.
fn accepts(key: &str, value: &Value) -> bool {
    let mut candidate = Map::new();
    candidate.insert(key.to_string(), value.clone());
    serde_json::from_value::<ConfigSnapshot>(Value::Object(candidate)).is_ok()
}
