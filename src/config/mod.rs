use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use gotcha::ConfigWrapper;
use serde::{Deserialize, Serialize};

/// Which distributed transport the bus forwards events to
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Postgres `NOTIFY` over the shared pool
    #[default]
    Postgres,
    /// In-process broadcast channel (single node)
    Local,
    /// No forwarding
    Disabled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// Channel name prefix (default: "events:")
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Bound on one forward in milliseconds (default: 2000)
    #[serde(default = "default_transport_timeout")]
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            channel_prefix: default_channel_prefix(),
            timeout_ms: default_transport_timeout(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionsConfig {
    /// Per-connection send bound in milliseconds (default: 5000)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
    /// Outbound queue length per connection (default: 256)
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// WebSocket ping interval in seconds (default: 30)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout(),
            buffer: default_buffer(),
            heartbeat_secs: default_heartbeat(),
        }
    }
}

impl ConnectionsConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

fn default_channel_prefix() -> String {
    crate::event_bus::transport::DEFAULT_CHANNEL_PREFIX.to_string()
}

fn default_transport_timeout() -> u64 {
    2000
}

fn default_send_timeout() -> u64 {
    5000
}

fn default_buffer() -> usize {
    256
}

fn default_heartbeat() -> u64 {
    30
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    pub database_url: String,
    /// Distributed transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Streaming connection configuration
    #[serde(default)]
    pub connections: ConnectionsConfig,
}

impl Settings {
    pub fn new() -> Result<ConfigWrapper<Self>, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables (EVENTHUB_APPLICATION__DATABASE_URL, ...)
            .add_source(Environment::with_prefix("EVENTHUB").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.transport.kind, TransportKind::Postgres);
        assert_eq!(settings.transport.channel_prefix, "events:");
        assert_eq!(settings.transport.timeout(), Duration::from_secs(2));
        assert_eq!(settings.connections.send_timeout(), Duration::from_secs(5));
        assert_eq!(settings.connections.buffer, 256);
        assert_eq!(settings.connections.heartbeat(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "database_url": "postgres://localhost/events",
            "transport": { "kind": "local" },
            "connections": { "buffer": 16 }
        }))
        .unwrap();

        assert_eq!(settings.transport.kind, TransportKind::Local);
        assert_eq!(settings.transport.channel_prefix, "events:");
        assert_eq!(settings.connections.buffer, 16);
        assert_eq!(settings.connections.send_timeout_ms, 5000);
    }
}
