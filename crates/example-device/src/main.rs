//! Example Field Device Simulator
//!
//! Runs one simulated device that answers gateway discovery probes, pushes
//! telemetry, and (for actuators) accepts state changes.
//!
//! # Usage
//!
//! ```bash
//! ./example-device --profile headlight --id headlight --port 9995
//! ./example-device --profile ac --id ac --port 9996
//! ./example-device --profile location --id car-loc --track route.csv
//! ```

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use example_device::{DeviceConfig, Profile, SimulatedDevice};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "example-device")]
#[command(about = "Simulated field device for gateway development")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device profile: headlight, ac, location
    #[arg(short, long)]
    profile: Option<Profile>,

    /// Device ID announced to the gateway
    #[arg(long)]
    id: Option<String>,

    /// Command port (actuators listen here)
    #[arg(long)]
    port: Option<u16>,

    /// Host announced to the gateway
    #[arg(long)]
    advertise_host: Option<String>,

    /// Discovery multicast group
    #[arg(long)]
    multicast_group: Option<Ipv4Addr>,

    /// Discovery multicast port
    #[arg(long)]
    multicast_port: Option<u16>,

    /// Telemetry interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// CSV track for the location profile
    #[arg(long)]
    track: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "example_device=debug,fieldgw_transport=debug"
    } else {
        "example_device=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            DeviceConfig::load(path).context("Failed to load config")?
        }
        None => DeviceConfig::default(),
    };

    if let Some(profile) = args.profile {
        config.profile = profile;
        if args.id.is_none() && args.config.is_none() {
            config.device_id = format!("{:?}", profile).to_ascii_lowercase();
        }
    }
    if let Some(id) = args.id {
        config.device_id = id;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.advertise_host {
        config.advertise_host = Some(host);
    }
    if let Some(group) = args.multicast_group {
        config.multicast_group = group;
    }
    if let Some(port) = args.multicast_port {
        config.multicast_port = port;
    }
    if let Some(interval) = args.interval_ms {
        config.telemetry_interval_ms = interval;
    }
    if let Some(track) = args.track {
        config.track = Some(track);
    }

    let logic = config.build_logic()?;
    let handle = SimulatedDevice::start(&config, logic)
        .await
        .context("Failed to start device")?;

    info!(
        "Device '{}' ({:?}) waiting for gateway probes on {}:{}",
        config.device_id, config.profile, config.multicast_group, config.multicast_port
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    handle.stop();

    Ok(())
}
