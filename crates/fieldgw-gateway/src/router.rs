//! Command router
//!
//! Turns one client request line into one response line. State changes for
//! actuators are send-then-commit: the registry only records the new state
//! after the device connector reported a successful delivery.

use std::sync::Arc;

use fieldgw_core::{
    ClientCommand, DeviceRegistry, GatewayError, GatewayResult, StateChange, WireMessage,
};
use fieldgw_transport::DeviceConnector;
use tracing::{debug, info, warn};

/// Routes client commands to the registry and to devices
#[derive(Clone)]
pub struct CommandRouter {
    registry: Arc<DeviceRegistry>,
    connector: Arc<dyn DeviceConnector>,
}

impl CommandRouter {
    pub fn new(registry: Arc<DeviceRegistry>, connector: Arc<dyn DeviceConnector>) -> Self {
        Self {
            registry,
            connector,
        }
    }

    /// Handle one request line and produce the response line
    ///
    /// Never fails: every error becomes its client-facing message.
    pub async fn handle_line(&self, line: &str) -> String {
        let result = match ClientCommand::parse(line) {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                debug!(kind = e.kind(), error = %e, "Request rejected");
                e.to_string()
            }
        }
    }

    /// Execute a parsed command
    pub async fn execute(&self, command: ClientCommand) -> GatewayResult<String> {
        match command {
            ClientCommand::GetDeviceState { device_id } => self.get_state(&device_id),
            ClientCommand::SetDeviceState { device_id, payload } => {
                self.set_state(&device_id, &payload).await
            }
        }
    }

    fn get_state(&self, device_id: &str) -> GatewayResult<String> {
        self.registry
            .lookup(device_id)
            .map(|device| device.last_state)
            .ok_or_else(|| GatewayError::DeviceNotFound(device_id.to_string()))
    }

    async fn set_state(&self, device_id: &str, payload: &str) -> GatewayResult<String> {
        // Snapshot: the registry lock is released before any network I/O
        let device = self
            .registry
            .lookup(device_id)
            .ok_or_else(|| GatewayError::DeviceNotFound(device_id.to_string()))?;

        if device.kind.is_sensor() {
            return Err(GatewayError::SensorReadOnly(device_id.to_string()));
        }

        let frame = WireMessage::StateChange(StateChange {
            device_id: device_id.to_string(),
            payload: payload.to_string(),
        })
        .encode_line()
        .map_err(|e| GatewayError::Delivery {
            device_id: device_id.to_string(),
            reason: e.to_string(),
        })?;

        if let Err(e) = self
            .connector
            .deliver(&device.address, device.transport, &frame)
            .await
        {
            warn!(device_id = %device_id, address = %device.address, error = %e, "State delivery failed");
            return Err(GatewayError::Delivery {
                device_id: device_id.to_string(),
                reason: e.to_string(),
            });
        }

        // The device may have been replaced in the meantime; committing to
        // the same id is still correct since delivery succeeded.
        if !self.registry.update_state(device_id, payload) {
            warn!(device_id = %device_id, "Device vanished before state could be recorded");
        }

        info!(device_id = %device_id, payload = %payload, "Device state changed");
        Ok(format!(
            "Device ID={}, LastStateChanged={}",
            device_id, payload
        ))
    }
}
