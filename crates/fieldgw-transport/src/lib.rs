//! fieldgw-transport - Transport adapters for the field device gateway
//!
//! This crate owns every socket the gateway touches, without any business
//! logic:
//!
//! - [`DeviceConnector`] - outbound delivery of one frame to a device,
//!   implemented over TCP/UDP by [`NetConnector`] and in memory by
//!   [`MockConnector`]
//! - [`udp`] - UDP and multicast socket setup for discovery and telemetry
//! - [`framing`] - bounded line framing for stream transports
//!
//! # Example
//!
//! ```ignore
//! use fieldgw_transport::{create_connector, ConnectorConfig, DeviceConnector};
//!
//! let connector = create_connector(&ConnectorConfig::default());
//! connector.deliver(&address, Transport::Tcp, b"{...}\n").await?;
//! ```

pub mod config;
mod connector;
pub mod error;
pub mod framing;
pub mod mock;
pub mod net;
pub mod udp;

pub use config::{ConnectorConfig, MockConfig};
pub use connector::DeviceConnector;
pub use error::TransportError;
pub use mock::MockConnector;
pub use net::NetConnector;

use std::sync::Arc;

/// Create a connector based on configuration
pub fn create_connector(config: &ConnectorConfig) -> Arc<dyn DeviceConnector> {
    match &config.mock {
        Some(mock) => Arc::new(MockConnector::new(mock)),
        None => Arc::new(NetConnector::new(config)),
    }
}
