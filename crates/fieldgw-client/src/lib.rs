//! fieldgw-client - Client for the field device gateway
//!
//! Speaks the line protocol of the gateway's client port: one
//! `COMMAND|DEVICE_ID[|PAYLOAD]` request line, one response line.
//!
//! # Example
//!
//! ```ignore
//! use fieldgw_client::GatewayClient;
//!
//! let mut client = GatewayClient::connect("127.0.0.1:9991").await?;
//! client.set_state("headlight", "on").await?;
//! let state = client.get_state("headlight").await?;
//! ```

pub mod client;
pub mod error;

pub use client::GatewayClient;
pub use error::{ClientError, Result};
