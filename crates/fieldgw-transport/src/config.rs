//! Connector configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outbound connector configuration (the `[actuator]` section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Write timeout in milliseconds (covers write, flush and shutdown)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Use an in-memory connector instead of real sockets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<MockConfig>,
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_write_timeout() -> u64 {
    2000
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            write_timeout_ms: default_write_timeout(),
            mock: None,
        }
    }
}

impl ConnectorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Mock connector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Start out unreachable (every delivery fails)
    #[serde(default)]
    pub unreachable: bool,
}
