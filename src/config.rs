//! Configuration types for live-quotes

use crate::connection::ConnectionConfig;
use crate::notify::GatewayConfig;
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Quote server location
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL shared by the REST API and the live channel
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// REST request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// REST request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Live connection tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    /// Time allowed from opening the transport to authentication (seconds)
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    /// Automatic reconnect attempts after a drop
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Delay before each reconnect attempt (milliseconds)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Data messages held while authenticating
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_handshake_timeout_secs() -> u64 {
    10
}
fn default_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_buffer_capacity() -> usize {
    64
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout_secs(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl ConnectionSettings {
    /// Build the manager configuration for `url`
    pub fn to_connection_config(&self, url: &str) -> ConnectionConfig {
        ConnectionConfig::new(url)
            .handshake_timeout(Duration::from_secs(self.handshake_timeout_secs))
            .max_reconnects(self.reconnect_attempts)
            .reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .buffer_capacity(self.buffer_capacity)
    }
}

/// Notification behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Window in which repeated notifications are suppressed (seconds)
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Delay before a notification is closed (seconds)
    #[serde(default = "default_auto_dismiss_secs")]
    pub auto_dismiss_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_dedup_window_secs() -> u64 {
    10
}
fn default_auto_dismiss_secs() -> u64 {
    10
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_window_secs: default_dedup_window_secs(),
            auto_dismiss_secs: default_auto_dismiss_secs(),
        }
    }
}

impl NotificationSettings {
    /// Build the gateway configuration
    pub fn to_gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            enabled: self.enabled,
            dedup_window: Duration::from_secs(self.dedup_window_secs),
            auto_dismiss: Duration::from_secs(self.auto_dismiss_secs),
        }
    }
}

/// Stored session
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// File holding the encoded credential
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Credential validity past its `exp` claim (hours)
    #[serde(default = "default_validity_hours")]
    pub validity_hours: i64,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".live-quotes/session.json")
}
fn default_validity_hours() -> i64 {
    24
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            validity_hours: default_validity_hours(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus exporter port; no exporter when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
