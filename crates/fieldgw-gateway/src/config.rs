//! Gateway configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) yields a working gateway.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use fieldgw_transport::ConnectorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to bind {what}: {reason}")]
    Bind { what: &'static str, reason: String },
}

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub actuator: ConnectorConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.discovery;
        if d.listen_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "discovery.listen_window_ms must be greater than zero".into(),
            ));
        }
        if d.listen_window_ms >= d.interval_ms {
            return Err(ConfigError::Invalid(format!(
                "discovery.listen_window_ms ({}) must be shorter than discovery.interval_ms ({})",
                d.listen_window_ms, d.interval_ms
            )));
        }
        if d.multicast_port == 0 {
            return Err(ConfigError::Invalid(
                "discovery.multicast_port must be set".into(),
            ));
        }
        if !self.telemetry.udp && !self.telemetry.tcp {
            return Err(ConfigError::Invalid(
                "at least one of telemetry.udp / telemetry.tcp must be enabled".into(),
            ));
        }
        if self.actuator.connect_timeout_ms == 0 || self.actuator.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "actuator timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Discovery engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Multicast group probes are sent to
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    /// Port of the multicast group
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,
    /// Local address the announcement socket binds to
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    /// Port announcements are received on (0 = ephemeral)
    #[serde(default = "default_response_port")]
    pub response_port: u16,
    /// Time between probe cycles in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    /// Length of the listen window in milliseconds (shorter than the interval)
    #[serde(default = "default_listen_window")]
    pub listen_window_ms: u64,
    /// Host advertised in probes; detected from the routing table if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_host: Option<String>,
    /// Multicast TTL for probes
    #[serde(default = "default_ttl")]
    pub multicast_ttl: u32,
    /// Interface used for multicast membership and sending
    #[serde(default = "default_interface")]
    pub multicast_interface: Ipv4Addr,
}

fn default_multicast_group() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 0, 1)
}

fn default_multicast_port() -> u16 {
    9999
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_response_port() -> u16 {
    9990
}

fn default_interval() -> u64 {
    5000
}

fn default_listen_window() -> u64 {
    2000
}

fn default_ttl() -> u32 {
    1
}

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_group: default_multicast_group(),
            multicast_port: default_multicast_port(),
            bind: default_bind(),
            response_port: default_response_port(),
            interval_ms: default_interval(),
            listen_window_ms: default_listen_window(),
            advertise_host: None,
            multicast_ttl: default_ttl(),
            multicast_interface: default_interface(),
        }
    }
}

impl DiscoveryConfig {
    pub fn group_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.multicast_group), self.multicast_port)
    }

    pub fn response_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.response_port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(self.listen_window_ms)
    }
}

// =============================================================================
// Client-facing server
// =============================================================================

/// Client-facing TCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_client_port")]
    pub port: u16,
}

fn default_client_port() -> u16 {
    9991
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_client_port(),
        }
    }
}

impl ClientConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

// =============================================================================
// Telemetry ingestion
// =============================================================================

/// Telemetry ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    /// Port for both the UDP socket and the TCP listener
    #[serde(default = "default_telemetry_port")]
    pub port: u16,
    /// Accept best-effort datagrams
    #[serde(default = "default_true")]
    pub udp: bool,
    /// Accept persistent device sessions
    #[serde(default = "default_true")]
    pub tcp: bool,
}

fn default_telemetry_port() -> u16 {
    8888
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_telemetry_port(),
            udp: true,
            tcp: true,
        }
    }
}

impl TelemetryConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = GatewayConfig::from_toml("").unwrap();
        assert_eq!(config.discovery.group_addr().to_string(), "224.0.0.1:9999");
        assert_eq!(config.discovery.response_port, 9990);
        assert_eq!(config.client.port, 9991);
        assert_eq!(config.telemetry.port, 8888);
        assert_eq!(config.actuator.connect_timeout_ms, 2000);
    }

    #[test]
    fn parse_full_config() {
        let config = GatewayConfig::from_toml(
            r#"
            [discovery]
            multicast_group = "239.1.2.3"
            multicast_port = 7000
            response_port = 7001
            interval_ms = 1000
            listen_window_ms = 400
            advertise_host = "10.0.0.2"

            [client]
            port = 7100

            [telemetry]
            port = 7200
            tcp = false

            [actuator]
            connect_timeout_ms = 250
            write_timeout_ms = 300
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery.group_addr().to_string(), "239.1.2.3:7000");
        assert_eq!(config.discovery.advertise_host.as_deref(), Some("10.0.0.2"));
        assert_eq!(config.discovery.listen_window(), Duration::from_millis(400));
        assert_eq!(config.client.addr().port(), 7100);
        assert!(config.telemetry.udp);
        assert!(!config.telemetry.tcp);
        assert_eq!(config.actuator.write_timeout_ms, 300);
    }

    #[test]
    fn listen_window_must_be_shorter_than_interval() {
        let err = GatewayConfig::from_toml(
            r#"
            [discovery]
            interval_ms = 1000
            listen_window_ms = 1000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_listen_window_is_rejected() {
        let err = GatewayConfig::from_toml("[discovery]\nlisten_window_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn telemetry_needs_a_transport() {
        let err =
            GatewayConfig::from_toml("[telemetry]\nudp = false\ntcp = false\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = GatewayConfig::from_toml("[discovery\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nport = 12345").unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.client.port, 12345);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = GatewayConfig::load("/nonexistent/fieldgw.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
