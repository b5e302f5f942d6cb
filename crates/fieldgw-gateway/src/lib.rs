//! fieldgw-gateway - The field device gateway service
//!
//! Wires the device registry to its three producers and consumers:
//!
//! - [`DiscoveryEngine`] - periodic multicast probe with a bounded listen window
//! - [`CommandRouter`] - client requests, send-then-commit for actuators
//! - [`TelemetryIngestor`] - device-pushed state over UDP and TCP
//!
//! # Example
//!
//! ```ignore
//! use fieldgw_gateway::{Gateway, GatewayConfig};
//! use fieldgw_transport::create_connector;
//!
//! let config = GatewayConfig::load("gateway.toml")?;
//! let connector = create_connector(&config.actuator);
//! let handle = Gateway::start(config, connector).await?;
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! ```

pub mod config;
pub mod discovery;
pub mod gateway;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use config::{ClientConfig, ConfigError, DiscoveryConfig, GatewayConfig, TelemetryConfig};
pub use discovery::{CycleStats, DiscoveryEngine, DiscoveryState};
pub use gateway::{Gateway, GatewayHandle};
pub use router::CommandRouter;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use telemetry::{IngestOutcome, TelemetryIngestor};
