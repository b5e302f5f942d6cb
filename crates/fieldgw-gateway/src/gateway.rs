//! Gateway task wiring
//!
//! [`Gateway::start`] binds every socket before spawning anything, so a port
//! that cannot be bound is reported as a configuration error and nothing is
//! left half-running.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fieldgw_core::DeviceRegistry;
use fieldgw_transport::{udp, DeviceConnector};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigError, GatewayConfig};
use crate::discovery::{DiscoveryEngine, DiscoveryState};
use crate::router::CommandRouter;
use crate::server::serve_clients;
use crate::shutdown::{self, ShutdownTrigger};
use crate::telemetry::TelemetryIngestor;

/// Time each loop gets to stop before it is abandoned
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Entry point for running a gateway
pub struct Gateway;

impl Gateway {
    /// Bind all sockets and spawn the gateway loops
    pub async fn start(
        config: GatewayConfig,
        connector: Arc<dyn DeviceConnector>,
    ) -> Result<GatewayHandle, ConfigError> {
        config.validate()?;
        let registry = Arc::new(DeviceRegistry::new());

        let client_listener = TcpListener::bind(config.client.addr())
            .await
            .map_err(|e| bind_error("client listener", e))?;
        let client_addr = client_listener
            .local_addr()
            .map_err(|e| bind_error("client listener", e))?;

        // UDP and TCP telemetry share one port number; with port 0 the
        // datagram socket picks it and the listener follows.
        let mut telemetry_addr = config.telemetry.addr();
        let telemetry_udp = if config.telemetry.udp {
            let socket = udp::bind_udp(telemetry_addr).map_err(|e| ConfigError::Bind {
                what: "telemetry UDP socket",
                reason: e.to_string(),
            })?;
            telemetry_addr = socket
                .local_addr()
                .map_err(|e| bind_error("telemetry UDP socket", e))?;
            Some(socket)
        } else {
            None
        };
        let telemetry_tcp = if config.telemetry.tcp {
            let listener = TcpListener::bind(telemetry_addr)
                .await
                .map_err(|e| bind_error("telemetry TCP listener", e))?;
            telemetry_addr = listener
                .local_addr()
                .map_err(|e| bind_error("telemetry TCP listener", e))?;
            Some(listener)
        } else {
            None
        };

        let discovery = Arc::new(DiscoveryEngine::bind(
            &config.discovery,
            registry.clone(),
            telemetry_addr.port(),
        )?);
        let discovery_addr = discovery
            .response_addr()
            .map_err(|e| bind_error("discovery response socket", e))?;

        // Everything is bound: spawn the loops
        let (trigger, shutdown) = shutdown::channel();
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let router = CommandRouter::new(registry.clone(), connector);
        tasks.push((
            "client server",
            tokio::spawn(serve_clients(client_listener, router, shutdown.clone())),
        ));

        let ingestor = Arc::new(TelemetryIngestor::new(registry.clone()));
        if let Some(socket) = telemetry_udp {
            let ingestor = ingestor.clone();
            let shutdown = shutdown.clone();
            tasks.push((
                "telemetry UDP",
                tokio::spawn(async move { ingestor.run_udp(socket, shutdown).await }),
            ));
        }
        if let Some(listener) = telemetry_tcp {
            tasks.push((
                "telemetry TCP",
                tokio::spawn(ingestor.clone().run_tcp(listener, shutdown.clone())),
            ));
        }

        {
            let discovery = discovery.clone();
            let shutdown = shutdown.clone();
            tasks.push((
                "discovery",
                tokio::spawn(async move { discovery.run(shutdown).await }),
            ));
        }

        info!(
            client = %client_addr,
            telemetry = %telemetry_addr,
            discovery = %discovery_addr,
            group = %config.discovery.group_addr(),
            "Gateway started"
        );

        Ok(GatewayHandle {
            client_addr,
            telemetry_addr,
            discovery_addr,
            registry,
            discovery,
            trigger,
            tasks,
        })
    }
}

fn bind_error(what: &'static str, e: std::io::Error) -> ConfigError {
    ConfigError::Bind {
        what,
        reason: e.to_string(),
    }
}

/// A running gateway
pub struct GatewayHandle {
    client_addr: SocketAddr,
    telemetry_addr: SocketAddr,
    discovery_addr: SocketAddr,
    registry: Arc<DeviceRegistry>,
    discovery: Arc<DiscoveryEngine>,
    trigger: ShutdownTrigger,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl GatewayHandle {
    /// Address clients connect to
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Address devices push telemetry to (UDP and TCP)
    pub fn telemetry_addr(&self) -> SocketAddr {
        self.telemetry_addr
    }

    /// Address discovery responses are received on
    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery_addr
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Stop every loop and wait for them to finish
    pub async fn shutdown(self) {
        info!("Shutting down gateway");
        self.trigger.fire();

        for (name, task) in self.tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "Gateway task failed"),
                Err(_) => warn!(task = name, "Gateway task did not stop in time"),
            }
        }

        info!("Gateway stopped");
    }
}
