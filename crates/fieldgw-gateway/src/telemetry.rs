//! Telemetry ingestor
//!
//! Devices push unsolicited state reports either as UDP datagrams or as lines
//! over a persistent TCP session. A bad payload only ever costs that payload;
//! the listeners keep running.

use std::net::SocketAddr;
use std::sync::Arc;

use fieldgw_core::{DeviceRegistry, WireMessage, MAX_FRAME_LEN};
use fieldgw_transport::framing::LineReader;
use fieldgw_transport::udp::RECV_ERROR_BACKOFF;
use fieldgw_transport::TransportError;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info, warn};

use crate::shutdown::Shutdown;

/// What happened to one telemetry frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    /// Well-formed, but the device was never discovered
    UnknownDevice,
    Malformed,
}

/// Applies device telemetry to the registry
pub struct TelemetryIngestor {
    registry: Arc<DeviceRegistry>,
}

impl TelemetryIngestor {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Decode one frame and apply it
    pub fn ingest(&self, frame: &[u8], source: SocketAddr) -> IngestOutcome {
        let telemetry = match WireMessage::decode_telemetry(frame) {
            Ok(telemetry) => telemetry,
            Err(e) => {
                warn!(%source, error = %e, "Dropping malformed telemetry");
                return IngestOutcome::Malformed;
            }
        };

        if self.registry.update_state(&telemetry.device_id, &telemetry.data) {
            debug!(device_id = %telemetry.device_id, data = %telemetry.data, %source, "Telemetry applied");
            IngestOutcome::Applied
        } else {
            debug!(device_id = %telemetry.device_id, %source, "Dropping telemetry from undiscovered device");
            IngestOutcome::UnknownDevice
        }
    }

    /// Receive datagrams until shutdown
    pub async fn run_udp(&self, socket: UdpSocket, mut shutdown: Shutdown) {
        let mut buf = vec![0u8; MAX_FRAME_LEN + 1];
        info!(addr = ?socket.local_addr().ok(), "Telemetry UDP listener started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        self.ingest(&buf[..len], source);
                    }
                    Err(e) => {
                        // Typically an ICMP error surfaced on the socket; keep listening
                        warn!(error = %e, "Telemetry receive failed");
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        debug!("Telemetry UDP listener stopped");
    }

    /// Accept device sessions until shutdown, one task per session
    pub async fn run_tcp(self: Arc<Self>, listener: TcpListener, mut shutdown: Shutdown) {
        info!(addr = ?listener.local_addr().ok(), "Telemetry TCP listener started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Device telemetry session opened");
                        let ingestor = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            ingestor.handle_session(stream, peer, shutdown).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept telemetry session"),
                },
            }
        }

        debug!("Telemetry TCP listener stopped");
    }

    async fn handle_session(&self, stream: TcpStream, peer: SocketAddr, mut shutdown: Shutdown) {
        let mut reader = LineReader::new(stream, MAX_FRAME_LEN);

        loop {
            let frame = tokio::select! {
                _ = shutdown.recv() => break,
                frame = reader.next_frame() => frame,
            };

            match frame {
                Ok(Some(frame)) if frame.is_empty() => continue,
                Ok(Some(frame)) => {
                    self.ingest(frame, peer);
                }
                Ok(None) => break,
                Err(TransportError::FrameTooLarge(len)) => {
                    warn!(%peer, len, "Telemetry line too long, closing session");
                    break;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Telemetry session failed");
                    break;
                }
            }
        }

        debug!(%peer, "Device telemetry session closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fieldgw_core::{DeviceAddress, DeviceKind, Telemetry, Transport};
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn source() -> SocketAddr {
        "10.0.0.5:40000".parse().unwrap()
    }

    fn telemetry(id: &str, data: &str) -> Vec<u8> {
        WireMessage::Telemetry(Telemetry {
            device_id: id.into(),
            data: data.into(),
        })
        .encode()
        .unwrap()
    }

    fn registry_with(id: &str) -> Arc<DeviceRegistry> {
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert(id, DeviceAddress::new("10.0.0.5", 9000), DeviceKind::Actuator, Transport::Tcp);
        registry
    }

    async fn eventually(registry: &DeviceRegistry, id: &str, expected: &str) {
        for _ in 0..100 {
            if registry.lookup(id).map(|d| d.last_state).as_deref() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reached state {:?}", id, expected);
    }

    #[test]
    fn telemetry_updates_known_device() {
        let registry = registry_with("dev1");
        let ingestor = TelemetryIngestor::new(registry.clone());

        assert_eq!(ingestor.ingest(&telemetry("dev1", "OFF"), source()), IngestOutcome::Applied);
        assert_eq!(registry.lookup("dev1").unwrap().last_state, "OFF");
    }

    #[test]
    fn unknown_device_is_not_registered() {
        let registry = Arc::new(DeviceRegistry::new());
        let ingestor = TelemetryIngestor::new(registry.clone());

        assert_eq!(
            ingestor.ingest(&telemetry("ghost", "ON"), source()),
            IngestOutcome::UnknownDevice
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn malformed_and_mistyped_frames_are_dropped() {
        let registry = registry_with("dev1");
        let ingestor = TelemetryIngestor::new(registry.clone());

        assert_eq!(ingestor.ingest(b"{\"device_id\":", source()), IngestOutcome::Malformed);
        let state_change = br#"{"type":"state_change","device_id":"dev1","payload":"ON"}"#;
        assert_eq!(ingestor.ingest(state_change, source()), IngestOutcome::Malformed);
        assert_eq!(registry.lookup("dev1").unwrap().last_state, "");
    }

    #[test]
    fn multi_line_data_is_dropped() {
        let registry = registry_with("dev1");
        registry.update_state("dev1", "ON");
        let ingestor = TelemetryIngestor::new(registry.clone());

        let raw = br#"{"type":"telemetry","device_id":"dev1","data":"A\nB"}"#;
        assert_eq!(ingestor.ingest(raw, source()), IngestOutcome::Malformed);
        assert_eq!(registry.lookup("dev1").unwrap().last_state, "ON");
    }

    #[tokio::test]
    async fn udp_listener_survives_bad_datagrams() {
        let registry = registry_with("dev1");
        let ingestor = Arc::new(TelemetryIngestor::new(registry.clone()));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (trigger, shutdown) = crate::shutdown::channel();

        let task = tokio::spawn({
            let ingestor = ingestor.clone();
            async move { ingestor.run_udp(socket, shutdown).await }
        });

        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        device.send_to(b"garbage", addr).await.unwrap();
        device.send_to(&telemetry("dev1", "OFF"), addr).await.unwrap();
        eventually(&registry, "dev1", "OFF").await;

        trigger.fire();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn udp_listener_survives_receive_errors() {
        let registry = registry_with("dev1");
        let ingestor = Arc::new(TelemetryIngestor::new(registry.clone()));

        // A port nobody listens on yet
        let peer_port = {
            let unused = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            unused.local_addr().unwrap().port()
        };

        // The unreachable reply to this datagram surfaces as a receive error
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(("127.0.0.1", peer_port)).await.unwrap();
        let _ = socket.send(b"x").await;
        let addr = socket.local_addr().unwrap();

        let (trigger, shutdown) = crate::shutdown::channel();
        let task = tokio::spawn({
            let ingestor = ingestor.clone();
            async move { ingestor.run_udp(socket, shutdown).await }
        });

        let device = UdpSocket::bind(("127.0.0.1", peer_port)).await.unwrap();
        device.send_to(&telemetry("dev1", "ON"), addr).await.unwrap();
        eventually(&registry, "dev1", "ON").await;

        trigger.fire();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn tcp_session_applies_each_line() {
        let registry = registry_with("dev1");
        let ingestor = Arc::new(TelemetryIngestor::new(registry.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (trigger, shutdown) = crate::shutdown::channel();

        let task = tokio::spawn(ingestor.clone().run_tcp(listener, shutdown));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = telemetry("dev1", "1");
        lines.extend_from_slice(b"\nnot json\n\n");
        lines.extend_from_slice(&telemetry("dev1", "2"));
        lines.push(b'\n');
        stream.write_all(&lines).await.unwrap();

        eventually(&registry, "dev1", "2").await;

        // The session stays open after a bad line
        stream.write_all(&telemetry("dev1", "3")).await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();
        eventually(&registry, "dev1", "3").await;

        trigger.fire();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
