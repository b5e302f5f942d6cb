//! example-device - Field Device Simulator Library
//!
//! Simulated sensors and actuators that speak the gateway's device protocol.
//!
//! # Modules
//!
//! - [`config`] - Device configuration (TOML)
//! - [`logic`] - Device behaviour: headlight, air conditioner, location track
//! - [`device`] - Discovery responder, telemetry pusher and command listener

pub mod config;
pub mod device;
pub mod logic;

pub use config::{DeviceConfig, DeviceError, Profile};
pub use device::{DeviceHandle, SimulatedDevice};
pub use logic::{AirConditioner, DeviceLogic, Headlight, LocationTrack, LogicError};
