//! Configuration management for WorkNet nodes.
//!
//! A node is configured from a single TOML file. Every field has a default,
//! so an empty file yields a runnable node that joins `SafeHatMesh` and
//! reports to the default sink.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub uplink: UplinkConfig,
    #[serde(default)]
    pub election: ElectionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timers: TimerConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
}

/// Local node identity and process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hardware address; a random locally-administered one is used when unset
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default = "default_mesh_prefix")]
    pub prefix: String,
    #[serde(default = "default_mesh_port")]
    pub port: u16,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    #[serde(default = "default_sink_url")]
    pub sink_url: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Reported uplink signal (dBm) when the link layer cannot measure one
    #[serde(default = "default_signal_dbm")]
    pub signal_dbm: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Margin (dB) a local signal must beat the recorded bridge by before contesting
    #[serde(default = "default_hysteresis")]
    pub hysteresis_db: i32,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Silence from the recorded bridge after which the role is considered vacant
    #[serde(default = "default_bridge_timeout")]
    pub bridge_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_allowed_failures")]
    pub allowed_failures: u32,
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_ms: u64,
    #[serde(default = "default_topology_interval")]
    pub topology_interval_ms: u64,
}

/// Motion thresholds (m/s², per axis) for child status classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_warning_accel")]
    pub warning_accel: f32,
    #[serde(default = "default_alert_accel")]
    pub alert_accel: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Evict child records not heard from within this window; never evict when unset
    #[serde(default)]
    pub child_ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorsConfig {
    #[serde(default = "default_sensor_entries")]
    pub entries: Vec<SensorEntry>,
}

/// One sensor slot on the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_read_interval")]
    pub read_interval_ms: u64,
}

fn default_name_prefix() -> String {
    "SafeHat".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mesh_prefix() -> String {
    "SafeHatMesh".to_string()
}

fn default_mesh_port() -> u16 {
    5555
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_broadcast_addr() -> String {
    "255.255.255.255".to_string()
}

fn default_sink_url() -> String {
    "http://192.168.4.1:5000/data".to_string()
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_signal_dbm() -> i32 {
    -60
}

fn default_hysteresis() -> i32 {
    5
}

fn default_heartbeat_interval() -> u64 {
    5000
}

fn default_bridge_timeout() -> u64 {
    20000
}

fn default_allowed_failures() -> u32 {
    3
}

fn default_min_interval() -> u64 {
    1000
}

fn default_max_interval() -> u64 {
    30000
}

fn default_probe_interval() -> u64 {
    10000
}

fn default_report_interval() -> u64 {
    5000
}

fn default_topology_interval() -> u64 {
    30000
}

fn default_warning_accel() -> f32 {
    15.0
}

fn default_alert_accel() -> f32 {
    25.0
}

fn default_enabled() -> bool {
    true
}

fn default_read_interval() -> u64 {
    1000
}

fn default_sensor_entries() -> Vec<SensorEntry> {
    vec![
        SensorEntry {
            name: "MPU6050".to_string(),
            enabled: true,
            read_interval_ms: 1000,
        },
        SensorEntry {
            name: "DHT22".to_string(),
            enabled: true,
            read_interval_ms: 2000,
        },
        SensorEntry {
            name: "BH1750".to_string(),
            enabled: true,
            read_interval_ms: 1000,
        },
    ]
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mac: None,
            name_prefix: default_name_prefix(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            prefix: default_mesh_prefix(),
            port: default_mesh_port(),
            bind_addr: default_bind_addr(),
            broadcast_addr: default_broadcast_addr(),
        }
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            sink_url: default_sink_url(),
            connect_attempts: default_connect_attempts(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            signal_dbm: default_signal_dbm(),
        }
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            hysteresis_db: default_hysteresis(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            bridge_timeout_ms: default_bridge_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            allowed_failures: default_allowed_failures(),
            min_interval_ms: default_min_interval(),
            max_interval_ms: default_max_interval(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval(),
            report_interval_ms: default_report_interval(),
            topology_interval_ms: default_topology_interval(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            warning_accel: default_warning_accel(),
            alert_accel: default_alert_accel(),
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            entries: default_sensor_entries(),
        }
    }
}

impl UplinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ElectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms)
    }
}

impl RetryConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl TimerConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn topology_interval(&self) -> Duration {
        Duration::from_millis(self.topology_interval_ms)
    }
}

impl CacheConfig {
    pub fn child_ttl(&self) -> Option<Duration> {
        self.child_ttl_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.as_ref().display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the protocol cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uplink.sink_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "uplink.sink_url must not be empty".to_string(),
            ));
        }

        if self.uplink.connect_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "uplink.connect_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.min_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "retry.min_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_interval_ms < self.retry.min_interval_ms {
            return Err(ConfigError::ValidationError(
                "retry.max_interval_ms must be greater than or equal to min_interval_ms"
                    .to_string(),
            ));
        }

        let intervals = [
            ("election.heartbeat_interval_ms", self.election.heartbeat_interval_ms),
            ("election.bridge_timeout_ms", self.election.bridge_timeout_ms),
            ("timers.probe_interval_ms", self.timers.probe_interval_ms),
            ("timers.report_interval_ms", self.timers.report_interval_ms),
            ("timers.topology_interval_ms", self.timers.topology_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than 0",
                name
            )));
        }

        if self.election.bridge_timeout_ms <= self.election.heartbeat_interval_ms {
            return Err(ConfigError::ValidationError(
                "election.bridge_timeout_ms must exceed heartbeat_interval_ms".to_string(),
            ));
        }

        if self.election.hysteresis_db < 0 {
            return Err(ConfigError::ValidationError(
                "election.hysteresis_db must not be negative".to_string(),
            ));
        }

        if self.status.alert_accel <= self.status.warning_accel {
            return Err(ConfigError::ValidationError(
                "status.alert_accel must be greater than warning_accel".to_string(),
            ));
        }

        if let Some(entry) = self.sensors.entries.iter().find(|e| e.read_interval_ms == 0) {
            return Err(ConfigError::ValidationError(format!(
                "sensor {} read_interval_ms must be greater than 0",
                entry.name
            )));
        }

        Ok(())
    }
}
