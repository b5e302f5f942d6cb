//! Concurrent device registry
//!
//! The registry is the only shared mutable state in the gateway. It is a
//! single map guarded by one reader/writer lock: lookups share the lock,
//! mutations take it exclusively for one in-memory update and release it
//! before returning. The lock is synchronous, so it can never be held
//! across an `.await` or any network I/O.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::device::{Device, DeviceAddress, DeviceKind, Transport};

/// Registry of discovered devices, keyed by device id
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device, or refresh address/kind/transport of a known one
    ///
    /// A known device keeps its `last_state`: rediscovery never erases state.
    /// Returns `true` if the id was not present before.
    pub fn upsert(
        &self,
        id: &str,
        address: DeviceAddress,
        kind: DeviceKind,
        transport: Transport,
    ) -> bool {
        let mut devices = self.devices.write();
        match devices.get_mut(id) {
            Some(device) => {
                device.address = address;
                device.kind = kind;
                device.transport = transport;
                false
            }
            None => {
                let mut device = Device::new(id, address, kind);
                device.transport = transport;
                devices.insert(id.to_string(), device);
                true
            }
        }
    }

    /// Replace the last known state of a known device
    ///
    /// Returns `false` without mutating anything if the id is unknown;
    /// unknown devices are never registered from state updates.
    pub fn update_state(&self, id: &str, new_state: &str) -> bool {
        let mut devices = self.devices.write();
        match devices.get_mut(id) {
            Some(device) => {
                device.last_state.clear();
                device.last_state.push_str(new_state);
                true
            }
            None => {
                debug!(device_id = %id, "State update for unknown device");
                false
            }
        }
    }

    /// Snapshot copy of a device
    pub fn lookup(&self, id: &str) -> Option<Device> {
        self.devices.read().get(id).cloned()
    }

    /// Snapshot of all devices, sorted by id
    pub fn snapshot(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.read().values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}
