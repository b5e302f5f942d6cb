//! fieldgwd - Field Device Gateway Daemon
//!
//! Discovers sensors and actuators over multicast, keeps their last known
//! state, and serves client commands over TCP.
//!
//! Usage:
//!   fieldgwd [OPTIONS]
//!
//! Without `--config` every setting takes its default (multicast group
//! 224.0.0.1:9999, clients on 9991, telemetry on 8888).

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fieldgw_gateway::{Gateway, GatewayConfig};
use fieldgw_transport::{create_connector, MockConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "fieldgwd=info,fieldgw_gateway=info,fieldgw_transport=info";
const VERBOSE_FILTER: &str =
    "fieldgwd=debug,fieldgw_gateway=debug,fieldgw_transport=debug,fieldgw_core=debug";

#[derive(Parser)]
#[command(name = "fieldgwd")]
#[command(author, version, about = "Field device gateway daemon")]
struct Args {
    /// Gateway config file (TOML)
    #[arg(short, long, env = "FIELDGW_CONFIG")]
    config: Option<PathBuf>,

    /// Client-facing TCP port
    #[arg(long)]
    client_port: Option<u16>,

    /// Telemetry port (UDP and TCP)
    #[arg(long)]
    telemetry_port: Option<u16>,

    /// Port discovery responses are received on
    #[arg(long)]
    response_port: Option<u16>,

    /// Discovery multicast group
    #[arg(long)]
    multicast_group: Option<Ipv4Addr>,

    /// Discovery multicast port
    #[arg(long)]
    multicast_port: Option<u16>,

    /// Address advertised to devices in discovery probes
    #[arg(long)]
    advertise_host: Option<String>,

    /// Record actuator commands instead of sending them
    #[arg(long)]
    mock: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut GatewayConfig) {
        if let Some(port) = self.client_port {
            config.client.port = port;
        }
        if let Some(port) = self.telemetry_port {
            config.telemetry.port = port;
        }
        if let Some(port) = self.response_port {
            config.discovery.response_port = port;
        }
        if let Some(group) = self.multicast_group {
            config.discovery.multicast_group = group;
        }
        if let Some(port) = self.multicast_port {
            config.discovery.multicast_port = port;
        }
        if let Some(host) = &self.advertise_host {
            config.discovery.advertise_host = Some(host.clone());
        }
        if self.mock {
            config.actuator.mock = Some(MockConfig::default());
        }
    }
}

fn init_logging(args: &Args) {
    let default = if args.verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    tracing::info!("Starting fieldgwd (field device gateway)");

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading config from: {}", path.display());
            GatewayConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => {
            tracing::info!("No config file provided, using defaults");
            GatewayConfig::default()
        }
    };
    args.apply_overrides(&mut config);

    if config.actuator.mock.is_some() {
        tracing::warn!("Mock connector enabled: actuator commands are not sent to devices");
    }

    let connector = create_connector(&config.actuator);
    let handle = Gateway::start(config, connector)
        .await
        .context("Failed to start gateway")?;

    tracing::info!("Clients: {}", handle.client_addr());
    tracing::info!("Telemetry: {}", handle.telemetry_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    let devices = handle.registry().snapshot();
    tracing::info!("{} devices known at shutdown", devices.len());
    for device in &devices {
        tracing::debug!(
            device_id = %device.id,
            address = %device.address,
            kind = %device.kind,
            last_state = %device.last_state,
            "Known device"
        );
    }

    handle.shutdown().await;
    Ok(())
}
