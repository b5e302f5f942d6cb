//! Wire messages exchanged between the gateway and devices
//!
//! Every message is a JSON object carrying a `"type"` tag. Datagram channels
//! carry one message per datagram; stream channels carry one message per
//! `\n`-terminated line.
//!
//! ```text
//! {"type":"probe","request":"DISCOVERY_REQUEST","gateway_host":"10.0.0.2","response_port":9990,"telemetry_port":8888}
//! {"type":"announce","device_id":"dev1","host":"10.0.0.5","port":9000,"kind":1}
//! {"type":"telemetry","device_id":"dev1","data":"OFF"}
//! {"type":"state_change","device_id":"dev1","payload":"ON"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{DeviceAddress, DeviceKind, Transport};

/// Request tag carried by every discovery probe
pub const DISCOVERY_REQUEST: &str = "DISCOVERY_REQUEST";

/// Largest frame accepted on any channel, in bytes
pub const MAX_FRAME_LEN: usize = 2048;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Frame of {0} bytes exceeds the frame size limit")]
    Oversized(usize),

    #[error("Empty frame")]
    Empty,

    #[error("Field {0} contains a line break")]
    LineBreak(&'static str),

    #[error("Unexpected message type: expected {expected}, got {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },
}

/// Discovery probe sent by the gateway to the multicast group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryProbe {
    pub request: String,
    /// Address devices should answer to
    pub gateway_host: String,
    /// Port the gateway listens on for announcements
    pub response_port: u16,
    /// Port the gateway ingests telemetry on
    pub telemetry_port: u16,
}

impl DiscoveryProbe {
    pub fn new(gateway_host: impl Into<String>, response_port: u16, telemetry_port: u16) -> Self {
        Self {
            request: DISCOVERY_REQUEST.to_string(),
            gateway_host: gateway_host.into(),
            response_port,
            telemetry_port,
        }
    }

    pub fn is_discovery_request(&self) -> bool {
        self.request == DISCOVERY_REQUEST
    }
}

/// Discovery response sent by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announce {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub kind: DeviceKind,
    #[serde(default)]
    pub transport: Transport,
}

impl Announce {
    pub fn address(&self) -> DeviceAddress {
        DeviceAddress::new(self.host.clone(), self.port)
    }
}

/// Unsolicited state report pushed by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    pub device_id: String,
    pub data: String,
}

/// Outbound state-change command for an actuator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub device_id: String,
    pub payload: String,
}

/// Any message that travels between the gateway and a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Probe(DiscoveryProbe),
    Announce(Announce),
    Telemetry(Telemetry),
    StateChange(StateChange),
}

impl WireMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            WireMessage::Probe(_) => "probe",
            WireMessage::Announce(_) => "announce",
            WireMessage::Telemetry(_) => "telemetry",
            WireMessage::StateChange(_) => "state_change",
        }
    }

    /// Encode as a single datagram
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FRAME_LEN {
            return Err(CodecError::Oversized(bytes.len()));
        }
        Ok(bytes)
    }

    /// Encode as a `\n`-terminated line for stream transports
    pub fn encode_line(&self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = self.encode()?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Decode one datagram or one line (trailing whitespace is ignored)
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(CodecError::Oversized(bytes.len()));
        }
        let trimmed = trim_ascii_end(bytes);
        if trimmed.is_empty() {
            return Err(CodecError::Empty);
        }
        Ok(serde_json::from_slice(trimmed)?)
    }

    /// Decode and require a telemetry message
    ///
    /// Reported state is echoed to clients as a single line, so data with a
    /// line break is rejected.
    pub fn decode_telemetry(bytes: &[u8]) -> Result<Telemetry, CodecError> {
        match Self::decode(bytes)? {
            WireMessage::Telemetry(t) if t.data.contains(['\r', '\n']) => {
                Err(CodecError::LineBreak("data"))
            }
            WireMessage::Telemetry(t) => Ok(t),
            other => Err(CodecError::UnexpectedType {
                expected: "telemetry",
                found: other.type_name(),
            }),
        }
    }

    /// Decode and require a state-change message
    pub fn decode_state_change(bytes: &[u8]) -> Result<StateChange, CodecError> {
        match Self::decode(bytes)? {
            WireMessage::StateChange(s) => Ok(s),
            other => Err(CodecError::UnexpectedType {
                expected: "state_change",
                found: other.type_name(),
            }),
        }
    }
}

fn trim_ascii_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_announce_from_device() {
        let raw = br#"{"type":"announce","device_id":"dev1","host":"10.0.0.5","port":9000,"kind":1}"#;
        let msg = WireMessage::decode(raw).unwrap();
        assert_eq!(
            msg,
            WireMessage::Announce(Announce {
                device_id: "dev1".into(),
                host: "10.0.0.5".into(),
                port: 9000,
                kind: DeviceKind::Actuator,
                transport: Transport::Tcp,
            })
        );
    }

    #[test]
    fn announce_with_udp_transport() {
        let raw = br#"{"type":"announce","device_id":"s","host":"h","port":1,"kind":0,"transport":"udp"}"#;
        let WireMessage::Announce(a) = WireMessage::decode(raw).unwrap() else {
            panic!("expected announce");
        };
        assert_eq!(a.transport, Transport::Udp);
        assert_eq!(a.address(), DeviceAddress::new("h", 1));
    }

    #[test]
    fn probe_carries_tag() {
        let probe = WireMessage::Probe(DiscoveryProbe::new("10.0.0.2", 9990, 8888));
        let text = String::from_utf8(probe.encode().unwrap()).unwrap();
        assert!(text.contains(r#""type":"probe""#));
        assert!(text.contains(DISCOVERY_REQUEST));
    }

    #[test]
    fn line_encoding_is_newline_terminated_and_decodable() {
        let msg = WireMessage::StateChange(StateChange {
            device_id: "dev1".into(),
            payload: "ON".into(),
        });
        let line = msg.encode_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let change = WireMessage::decode_state_change(&line).unwrap();
        assert_eq!(change.payload, "ON");
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let raw = br#"{"type":"announce","device_id":"d","host":"h","port":1,"kind":9}"#;
        assert!(matches!(
            WireMessage::decode(raw),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn garbage_and_empty_frames_are_rejected() {
        assert!(matches!(
            WireMessage::decode(b"\x00\x01garbage"),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(WireMessage::decode(b" \n"), Err(CodecError::Empty)));
        let big = vec![b' '; MAX_FRAME_LEN + 1];
        assert!(matches!(
            WireMessage::decode(&big),
            Err(CodecError::Oversized(_))
        ));
    }

    #[test]
    fn telemetry_data_must_be_one_line() {
        let raw = br#"{"type":"telemetry","device_id":"dev1","data":"A\nB"}"#;
        assert!(matches!(
            WireMessage::decode_telemetry(raw),
            Err(CodecError::LineBreak("data"))
        ));
        let raw = br#"{"type":"telemetry","device_id":"dev1","data":"A\rB"}"#;
        assert!(WireMessage::decode_telemetry(raw).is_err());
    }

    #[test]
    fn wrong_type_is_reported() {
        let raw = br#"{"type":"telemetry","device_id":"d","data":"x"}"#;
        match WireMessage::decode_state_change(raw) {
            Err(CodecError::UnexpectedType { expected, found }) => {
                assert_eq!(expected, "state_change");
                assert_eq!(found, "telemetry");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
