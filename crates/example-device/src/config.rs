//! Simulated device configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::{AirConditioner, DeviceLogic, Headlight, LocationTrack, LogicError};

/// Errors raised while setting up a simulated device
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to bind {what}: {reason}")]
    Bind { what: &'static str, reason: String },

    #[error(transparent)]
    Logic(#[from] LogicError),
}

/// Which simulated device to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Headlight,
    Ac,
    Location,
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "headlight" => Ok(Profile::Headlight),
            "ac" => Ok(Profile::Ac),
            "location" => Ok(Profile::Location),
            other => Err(format!(
                "unknown profile '{}' (expected headlight, ac or location)",
                other
            )),
        }
    }
}

/// Complete simulated device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier announced to the gateway
    #[serde(default = "default_id")]
    pub device_id: String,

    #[serde(default = "default_profile")]
    pub profile: Profile,

    /// Address the device binds its sockets on
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Command port for actuators (0 = ephemeral); announced to the gateway
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host announced to the gateway; detected if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_host: Option<String>,

    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,

    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,

    /// Time between telemetry pushes in milliseconds
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_ms: u64,

    /// Fixed telemetry destination, used until a probe announces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_target: Option<SocketAddr>,

    /// CSV track for the location profile (built-in track if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<PathBuf>,
}

fn default_id() -> String {
    "headlight".to_string()
}

fn default_profile() -> Profile {
    Profile::Headlight
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    9995
}

fn default_multicast_group() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 0, 1)
}

fn default_multicast_port() -> u16 {
    9999
}

fn default_telemetry_interval() -> u64 {
    5000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: default_id(),
            profile: default_profile(),
            bind: default_bind(),
            port: default_port(),
            advertise_host: None,
            multicast_group: default_multicast_group(),
            multicast_port: default_multicast_port(),
            telemetry_interval_ms: default_telemetry_interval(),
            telemetry_target: None,
            track: None,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DeviceError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms.max(1))
    }

    /// Build the logic for the configured profile
    pub fn build_logic(&self) -> Result<Box<dyn DeviceLogic>, DeviceError> {
        Ok(match self.profile {
            Profile::Headlight => Box::new(Headlight::random()),
            Profile::Ac => Box::new(AirConditioner::random()),
            Profile::Location => match &self.track {
                Some(path) => Box::new(LocationTrack::from_csv(path, 1)?),
                None => Box::new(LocationTrack::builtin()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use fieldgw_core::DeviceKind;

    use super::*;

    #[test]
    fn defaults_match_gateway_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.multicast_group, Ipv4Addr::new(224, 0, 0, 1));
        assert_eq!(config.multicast_port, 9999);
        assert_eq!(config.telemetry_interval(), Duration::from_secs(5));
    }

    #[test]
    fn load_profile_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "device_id = \"car-loc\"\nprofile = \"location\"\ntelemetry_interval_ms = 250"
        )
        .unwrap();

        let config = DeviceConfig::load(file.path()).unwrap();
        assert_eq!(config.device_id, "car-loc");
        assert_eq!(config.profile, Profile::Location);
        assert_eq!(config.build_logic().unwrap().kind(), DeviceKind::Sensor);
    }

    #[test]
    fn profile_from_str() {
        assert_eq!("AC".parse::<Profile>().unwrap(), Profile::Ac);
        assert!("toaster".parse::<Profile>().is_err());
    }
}
