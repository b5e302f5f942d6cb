//! fieldgw-cli - Command-line client for the field device gateway

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldgw_client::GatewayClient;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "fieldgw-cli")]
#[command(author, version, about = "Field device gateway CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Gateway client address
    #[arg(short, long, env = "FIELDGW_SERVER", default_value = "127.0.0.1:9991")]
    server: String,

    /// Response timeout in milliseconds
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the last known state of a device
    Get {
        /// Device ID
        device: String,
    },

    /// Change the state of an actuator
    Set {
        /// Device ID
        device: String,

        /// New state payload
        payload: String,
    },

    /// Send a raw request line (COMMAND|DEVICE_ID[|PAYLOAD])
    Raw {
        /// Request line
        line: String,
    },

    /// Interactive session: one request per input line
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut client = GatewayClient::connect_with_timeout(
        cli.server.as_str(),
        Duration::from_millis(cli.timeout_ms),
        Duration::from_secs(5),
    )
    .await
    .with_context(|| format!("Failed to connect to gateway at {}", cli.server))?;
    tracing::debug!(server = %client.peer_addr(), "Connected");

    match &cli.command {
        Commands::Get { device } => {
            println!("{}", client.get_state(device).await?);
        }

        Commands::Set { device, payload } => {
            println!("{}", client.set_state(device, payload).await?);
        }

        Commands::Raw { line } => {
            println!("{}", client.request(line).await?);
        }

        Commands::Shell => shell(&mut client).await?,
    }

    Ok(())
}

/// Forward stdin lines until EOF or `quit`
async fn shell(client: &mut GatewayClient) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!(
        "Connected to {}. Enter COMMAND|DEVICE_ID[|PAYLOAD], or 'quit' to exit.",
        client.peer_addr()
    );

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let response = client.request(line).await?;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    Ok(())
}
