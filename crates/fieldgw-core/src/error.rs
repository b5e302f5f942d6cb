//! Common error types for the gateway

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur while handling gateway traffic
///
/// The `Display` text of the client-facing variants is exactly what the
/// client receives as its response line.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown device id referenced by a client command
    #[error("Device ID={0} not found")]
    DeviceNotFound(String),

    /// Client attempted to change a sensor's state
    #[error("Sensors cannot change state")]
    SensorReadOnly(String),

    /// Request did not follow `COMMAND|DEVICE_ID[|PAYLOAD]`
    #[error("Invalid request format, expected COMMAND|DEVICE_ID[|PAYLOAD]")]
    InvalidFormat(String),

    /// Command token not recognized
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Outbound delivery to a device failed
    #[error("Failed to deliver state to device ID={device_id}: {reason}")]
    Delivery { device_id: String, reason: String },
}

impl GatewayError {
    /// Short machine-friendly label, used as a tracing field
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::DeviceNotFound(_) => "lookup",
            GatewayError::SensorReadOnly(_) => "permission",
            GatewayError::InvalidFormat(_) | GatewayError::UnknownCommand(_) => "request",
            GatewayError::Delivery { .. } => "transport",
        }
    }
}
