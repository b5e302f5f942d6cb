//! Device record and its supporting types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Device kind as announced during discovery
///
/// On the wire the kind is a number: `0` for sensors, `1` for actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeviceKind {
    /// Reports state only; rejects state-change commands
    Sensor,
    /// Accepts state-change commands and reports state
    Actuator,
}

impl DeviceKind {
    pub fn is_sensor(self) -> bool {
        matches!(self, DeviceKind::Sensor)
    }
}

impl TryFrom<u8> for DeviceKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceKind::Sensor),
            1 => Ok(DeviceKind::Actuator),
            other => Err(format!("unknown device kind {}", other)),
        }
    }
}

impl From<DeviceKind> for u8 {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Sensor => 0,
            DeviceKind::Actuator => 1,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Sensor => f.write_str("sensor"),
            DeviceKind::Actuator => f.write_str("actuator"),
        }
    }
}

/// Channel used to reach a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
            Transport::Udp => f.write_str("udp"),
        }
    }
}

/// Network location of a device at the time of its last discovery
///
/// The host is kept as text and resolved on every send, so a device that
/// announces a hostname is re-resolved each time it is contacted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// True when the address cannot possibly be dialed
    pub fn is_unroutable(&self) -> bool {
        self.host.is_empty() || self.port == 0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A discovered sensor or actuator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier, unique within the registry
    pub id: String,
    pub address: DeviceAddress,
    pub kind: DeviceKind,
    /// Last reported (or last successfully commanded) state; empty until known
    pub last_state: String,
    pub transport: Transport,
}

impl Device {
    pub fn new(id: impl Into<String>, address: DeviceAddress, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            address,
            kind,
            last_state: String::new(),
            transport: Transport::default(),
        }
    }
}
