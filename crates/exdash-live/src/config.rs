/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed live manager configuration
[POS]:    Configuration layer - backend endpoints, stream timing, log retention
[UPDATE]: When adding new configuration options
*/

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use exdash_adapter::{ClientConfig, StreamEnvironment, WsTransport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::activity_log::DEFAULT_LOG_CAPACITY;
use crate::backoff::BackoffPolicy;
use crate::manager::ManagerSettings;

/// Top-level configuration for the live stream runner
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LiveConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the dashboard backend lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            stream_url: default_stream_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Live stream behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Environment started when the active exchange matches `auto_start_exchange`
    #[serde(default = "default_env")]
    pub default_env: String,
    /// Active-exchange id that triggers an automatic start
    #[serde(default = "default_auto_start_exchange")]
    pub auto_start_exchange: String,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_reconnect_floor_ms")]
    pub reconnect_floor_ms: u64,
    #[serde(default = "default_reconnect_ceiling_ms")]
    pub reconnect_ceiling_ms: u64,
    #[serde(default = "default_reconnect_factor")]
    pub reconnect_factor: f64,
    #[serde(default = "default_balance_refresh_delay_ms")]
    pub balance_refresh_delay_ms: u64,
    /// Hide assets whose free amount is at or below this (unless locked)
    #[serde(default)]
    pub min_free_balance: Decimal,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_env: default_env(),
            auto_start_exchange: default_auto_start_exchange(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            reconnect_floor_ms: default_reconnect_floor_ms(),
            reconnect_ceiling_ms: default_reconnect_ceiling_ms(),
            reconnect_factor: default_reconnect_factor(),
            balance_refresh_delay_ms: default_balance_refresh_delay_ms(),
            min_free_balance: Decimal::ZERO,
        }
    }
}

/// Activity log retention and optional file output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
    /// Also write tracing output to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
            file: None,
        }
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000/api/".to_string()
}

fn default_stream_url() -> String {
    "ws://127.0.0.1:8000/ws/user-stream".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_env() -> String {
    "testnet".to_string()
}

fn default_auto_start_exchange() -> String {
    "binance_testnet".to_string()
}

fn default_keepalive_interval_secs() -> u64 {
    25 * 60
}

fn default_reconnect_floor_ms() -> u64 {
    1_500
}

fn default_reconnect_ceiling_ms() -> u64 {
    20_000
}

fn default_reconnect_factor() -> f64 {
    1.6
}

fn default_balance_refresh_delay_ms() -> u64 {
    500
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

impl LiveConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {path}"))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let stream = &self.stream;
        if stream.default_env.trim().is_empty() {
            bail!("stream.default_env must not be empty");
        }
        if stream.keepalive_interval_secs == 0 {
            bail!("stream.keepalive_interval_secs must be positive");
        }
        if stream.reconnect_floor_ms == 0 {
            bail!("stream.reconnect_floor_ms must be positive");
        }
        if stream.reconnect_ceiling_ms < stream.reconnect_floor_ms {
            bail!(
                "stream.reconnect_ceiling_ms ({}) is below reconnect_floor_ms ({})",
                stream.reconnect_ceiling_ms,
                stream.reconnect_floor_ms
            );
        }
        if !stream.reconnect_factor.is_finite() || stream.reconnect_factor < 1.0 {
            bail!("stream.reconnect_factor must be >= 1.0");
        }
        if self.backend.timeout_secs == 0 {
            bail!("backend.timeout_secs must be positive");
        }
        if self.backend.connect_timeout_secs == 0 {
            bail!("backend.connect_timeout_secs must be positive");
        }
        check_url_scheme("backend.api_base_url", &self.backend.api_base_url, &["http", "https"])?;
        check_url_scheme("backend.stream_url", &self.backend.stream_url, &["ws", "wss"])?;
        Ok(())
    }

    pub fn default_env(&self) -> StreamEnvironment {
        StreamEnvironment::new(self.stream.default_env.clone())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.backend.timeout_secs),
            connect_timeout: Duration::from_secs(self.backend.connect_timeout_secs),
        }
    }

    /// Socket transport bounded by the same connect timeout as HTTP requests
    pub fn transport(&self) -> WsTransport {
        WsTransport::with_connect_timeout(Duration::from_secs(self.backend.connect_timeout_secs))
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            keepalive_interval: Duration::from_secs(self.stream.keepalive_interval_secs),
            backoff: BackoffPolicy {
                floor: Duration::from_millis(self.stream.reconnect_floor_ms),
                ceiling: Duration::from_millis(self.stream.reconnect_ceiling_ms),
                factor: self.stream.reconnect_factor,
            },
            balance_refresh_delay: Duration::from_millis(self.stream.balance_refresh_delay_ms),
        }
    }
}

fn check_url_scheme(field: &str, value: &str, schemes: &[&str]) -> anyhow::Result<()> {
    let url = Url::parse(value).with_context(|| format!("{field} is not a valid URL: {value}"))?;
    if !schemes.contains(&url.scheme()) {
        bail!(
            "{field} must use one of {schemes:?}, got {}://",
            url.scheme()
        );
    }
    Ok(())
}
