//! Application configuration.
//!
//! Loaded from a TOML file layered under `DESK__SECTION__KEY` environment
//! variables. Every field has a default, so an empty file (or no file) is a
//! valid configuration pointed at a local engine.

use crate::error::{AppError, AppResult};
use config::{Config, Environment, File, FileFormat};
use desk_ws::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable prefix; `DESK__LINK__HEARTBEAT_INTERVAL_MS=1000`.
pub const ENV_PREFIX: &str = "DESK";
const ENV_SEPARATOR: &str = "__";

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine HTTP base URL.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Event stream URL. Derived from `server_url` when unset.
    #[serde(default)]
    pub ws_url: Option<String>,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub settings: SettingsConfig,

    #[serde(default)]
    pub logbook: LogBookConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            ws_url: None,
            link: LinkConfig::default(),
            progress: ProgressConfig::default(),
            settings: SettingsConfig::default(),
            logbook: LogBookConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Event stream link timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_liveness_grace_ms")]
    pub liveness_grace_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_heartbeat_interval_ms() -> u64 {
    25_000
}

fn default_liveness_grace_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_grace_ms: default_liveness_grace_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Progress display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// How long a final snapshot stays visible.
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,
}

fn default_linger_ms() -> u64 {
    3_000
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            linger_ms: default_linger_ms(),
        }
    }
}

impl ProgressConfig {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

/// Settings persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    1_000
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SettingsConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBookConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

fn default_log_capacity() -> usize {
    200
}

impl Default for LogBookConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

/// Request layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
    /// Sent as `X-API-KEY`. Prefer the environment over the file.
    #[serde(default)]
    pub access_key: Option<String>,
}

fn default_api_timeout_ms() -> u64 {
    10_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_api_timeout_ms(),
            access_key: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// Load from `path` (required when given, optional at the default
    /// location) and the process environment.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_PATH)
                .format(FileFormat::Toml)
                .required(false),
        };
        Self::build(
            Config::builder().add_source(file),
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
    }

    /// Parse a TOML document, without environment overrides.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        let app: Self = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        env: Environment,
    ) -> AppResult<Self> {
        let app: Self = builder.add_source(env).build()?.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Check values the console cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "server_url must be http(s): {}",
                self.server_url
            )));
        }
        if self.link.heartbeat_interval_ms == 0 {
            return Err(AppError::Config(
                "link.heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.logbook.capacity == 0 {
            return Err(AppError::Config(
                "logbook.capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Event stream URL: explicit, or `server_url` with a ws scheme and
    /// `/ws` path.
    pub fn ws_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }

    /// Link settings for the engine connection manager.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.ws_url(),
            heartbeat_interval_ms: self.link.heartbeat_interval_ms,
            liveness_grace_ms: self.link.liveness_grace_ms,
            reconnect_delay_ms: self.link.reconnect_delay_ms,
            connect_timeout_ms: self.link.connect_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.link.heartbeat_interval_ms, 25_000);
        assert_eq!(config.progress.linger(), Duration::from_secs(3));
        assert_eq!(config.settings.debounce(), Duration::from_secs(1));
        assert_eq!(config.logbook.capacity, 200);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
server_url = "https://engine.example.com/"

[link]
heartbeat_interval_ms = 10000

[api]
access_key = "secret"
"#,
        )
        .unwrap();
        assert_eq!(config.link.heartbeat_interval_ms, 10_000);
        assert_eq!(config.link.reconnect_delay_ms, 5_000);
        assert_eq!(config.api.access_key.as_deref(), Some("secret"));
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.ws_url(), "wss://engine.example.com/ws");
    }

    #[test]
    fn test_ws_url_derivation() {
        let config = AppConfig::default();
        assert_eq!(config.ws_url(), "ws://127.0.0.1:8000/ws");

        let explicit = AppConfig {
            ws_url: Some("ws://other:9000/events".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(explicit.ws_url(), "ws://other:9000/events");
        assert_eq!(explicit.connection_config().url, "ws://other:9000/events");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut vars = HashMap::new();
        vars.insert(
            "DESK__LINK__RECONNECT_DELAY_MS".to_string(),
            "750".to_string(),
        );
        vars.insert("DESK__SERVER_URL".to_string(), "http://10.0.0.5:8000".to_string());

        let builder = Config::builder().add_source(File::from_str(
            "[link]\nreconnect_delay_ms = 2000\n",
            FileFormat::Toml,
        ));
        let env = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(Some(vars));

        let config = AppConfig::build(builder, env).unwrap();
        assert_eq!(config.link.reconnect_delay_ms, 750);
        assert_eq!(config.server_url, "http://10.0.0.5:8000");
        assert_eq!(config.connection_config().reconnect_delay_ms, 750);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_toml("server_url = \"ftp://engine\"").is_err());
        assert!(AppConfig::from_toml("[link]\nheartbeat_interval_ms = 0").is_err());
    }

    #[test]
    fn test_defaults_survive_toml_round_trip() {
        let text = toml::to_string(&AppConfig::default()).unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }
}
