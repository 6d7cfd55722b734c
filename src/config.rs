//! JSON configuration file.
//!
//! Every sink has its own optional section. A present section is enabled
//! unless it says `"enabled": false`; an absent section is disabled. Missing
//! keys fall back to the defaults below.
//!
//! ```json
//! {
//!   "mqtt": { "server": "broker.local", "prefix": "weather" },
//!   "influxdb": { "database": "measurements", "policy": "sensor" },
//!   "sensors": [ { "id": "eeff", "name": "Sauna", "location": "Cellar" } ]
//! }
//! ```

use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Errors returned when loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub mqtt: Option<MqttConfig>,
    pub homie: Option<HomieConfig>,
    pub prometheuspush: Option<PushGatewayConfig>,
    pub influxdb: Option<InfluxDbConfig>,
    /// Raw sensor directory entries; malformed ones are skipped when the
    /// directory is built.
    #[serde(default)]
    pub sensors: Vec<serde_json::Value>,
}

/// Classic message bus sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub client: String,
    pub server: String,
    pub port: u16,
    pub prefix: String,
    pub timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client: "Ruuvi-Mqtt".into(),
            server: "127.0.0.1".into(),
            port: 1883,
            prefix: "weather".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Homie discovery convention sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HomieConfig {
    pub enabled: bool,
    pub client: String,
    pub server: String,
    pub port: u16,
    /// Root topic of the Homie tree.
    pub prefix: String,
    /// Device ids are `<device_prefix>-<sensor id>`.
    pub device_prefix: String,
    pub timeout_secs: u64,
}

impl Default for HomieConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client: "Ruuvi-Homie".into(),
            server: "127.0.0.1".into(),
            port: 1883,
            prefix: "homie".into(),
            device_prefix: "ruuvi".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Prometheus push gateway sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushGatewayConfig {
    pub enabled: bool,
    /// Job names are `<client>_<sensor id>`.
    pub client: String,
    pub server: String,
    pub port: u16,
    pub prefix: String,
    pub timeout_secs: u64,
}

impl Default for PushGatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client: "Ruuvi-Prometheus".into(),
            server: "127.0.0.1".into(),
            port: 9091,
            prefix: "weather".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// InfluxDB 1.x sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxDbConfig {
    pub enabled: bool,
    /// Sent as the HTTP user agent.
    pub client: String,
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub policy: String,
    pub retention_duration: String,
    pub replication: u32,
    /// Measurement name of written points.
    pub prefix: String,
    pub timeout_secs: u64,
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client: "Ruuvi-Influxdb".into(),
            server: "127.0.0.1".into(),
            port: 8086,
            username: "influxdb".into(),
            password: "influxdb".into(),
            database: "measurements".into(),
            policy: "sensor".into(),
            retention_duration: "INF".into(),
            replication: 1,
            prefix: "weather".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

macro_rules! timeout {
    ($($config:ty),*) => {
        $(impl $config {
            pub fn timeout(&self) -> Duration {
                Duration::from_secs(self.timeout_secs)
            }
        })*
    };
}

timeout!(MqttConfig, HomieConfig, PushGatewayConfig, InfluxDbConfig);

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn mqtt(&self) -> Option<&MqttConfig> {
        self.mqtt.as_ref().filter(|c| c.enabled)
    }

    pub fn homie(&self) -> Option<&HomieConfig> {
        self.homie.as_ref().filter(|c| c.enabled)
    }

    pub fn prometheuspush(&self) -> Option<&PushGatewayConfig> {
        self.prometheuspush.as_ref().filter(|c| c.enabled)
    }

    pub fn influxdb(&self) -> Option<&InfluxDbConfig> {
        self.influxdb.as_ref().filter(|c| c.enabled)
    }

    /// Log the effective configuration of every sink.
    pub fn log_summary(&self) {
        match &self.mqtt {
            Some(c) => info!(
                "MQTT: enabled={} client={} server={}:{} prefix={}",
                c.enabled, c.client, c.server, c.port, c.prefix
            ),
            None => info!("MQTT: not configured"),
        }
        match &self.homie {
            Some(c) => info!(
                "Homie: enabled={} client={} server={}:{} prefix={} device_prefix={}",
                c.enabled, c.client, c.server, c.port, c.prefix, c.device_prefix
            ),
            None => info!("Homie: not configured"),
        }
        match &self.prometheuspush {
            Some(c) => info!(
                "Prometheus push: enabled={} client={} server={}:{} prefix={}",
                c.enabled, c.client, c.server, c.port, c.prefix
            ),
            None => info!("Prometheus push: not configured"),
        }
        match &self.influxdb {
            Some(c) => info!(
                "InfluxDB: enabled={} server={}:{} username={} password=*** database={} policy={} prefix={}",
                c.enabled, c.server, c.port, c.username, c.database, c.policy, c.prefix
            ),
            None => info!("InfluxDB: not configured"),
        }
        info!("Sensor directory: {} entries", self.sensors.len());
    }
}
