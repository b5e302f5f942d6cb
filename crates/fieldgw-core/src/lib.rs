//! fieldgw-core - Core types for the field device gateway
//!
//! This crate provides the pieces every other gateway crate builds on:
//!
//! - [`device`] - the `Device` record and its kind/address/transport
//! - [`registry`] - the concurrent device registry
//! - [`command`] - the `COMMAND|DEVICE_ID[|PAYLOAD]` client grammar
//! - [`codec`] - JSON wire messages exchanged with devices
//! - [`error`] - the gateway error taxonomy

pub mod codec;
pub mod command;
pub mod device;
pub mod error;
pub mod registry;

pub use codec::{
    Announce, CodecError, DiscoveryProbe, StateChange, Telemetry, WireMessage, DISCOVERY_REQUEST,
    MAX_FRAME_LEN,
};
pub use command::{ClientCommand, CommandKind};
pub use device::{Device, DeviceAddress, DeviceKind, Transport};
pub use error::{GatewayError, GatewayResult};
pub use registry::DeviceRegistry;
