//! Simulated device runtime
//!
//! A running device has up to three tasks:
//!
//! - discovery responder: answers gateway probes with an announcement and
//!   learns where to push telemetry
//! - telemetry pusher: sends the current reading on every interval tick
//! - command listener (actuators only): applies `state_change` lines and
//!   pushes the new state right away

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use fieldgw_core::{
    Announce, DeviceAddress, DeviceKind, Telemetry, Transport, WireMessage, MAX_FRAME_LEN,
};
use fieldgw_transport::framing::LineReader;
use fieldgw_transport::{net, udp, TransportError};
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, DeviceError};
use crate::logic::DeviceLogic;

/// Shared state of one simulated device
pub struct SimulatedDevice {
    device_id: String,
    kind: DeviceKind,
    logic: Mutex<Box<dyn DeviceLogic>>,
    advertise_host: String,
    announce_port: u16,
    telemetry_socket: UdpSocket,
    telemetry_target: RwLock<Option<SocketAddr>>,
}

impl SimulatedDevice {
    /// Bind the device sockets and spawn its tasks
    pub async fn start(
        config: &DeviceConfig,
        logic: Box<dyn DeviceLogic>,
    ) -> Result<DeviceHandle, DeviceError> {
        let kind = logic.kind();

        let discovery_socket = udp::bind_multicast(
            SocketAddr::new(config.bind, config.multicast_port),
            config.multicast_group,
            Ipv4Addr::UNSPECIFIED,
        )
        .map_err(|e| DeviceError::Bind {
            what: "discovery socket",
            reason: e.to_string(),
        })?;
        let discovery_addr = local_addr(&discovery_socket, "discovery socket")?;

        let command_listener = if kind == DeviceKind::Actuator {
            let listener = TcpListener::bind(SocketAddr::new(config.bind, config.port))
                .await
                .map_err(|e| DeviceError::Bind {
                    what: "command listener",
                    reason: e.to_string(),
                })?;
            Some(listener)
        } else {
            None
        };
        let command_addr = match &command_listener {
            Some(listener) => Some(listener.local_addr().map_err(|e| DeviceError::Bind {
                what: "command listener",
                reason: e.to_string(),
            })?),
            None => None,
        };

        let telemetry_socket =
            udp::bind_udp(SocketAddr::new(config.bind, 0)).map_err(|e| DeviceError::Bind {
                what: "telemetry socket",
                reason: e.to_string(),
            })?;

        let advertise_host = match &config.advertise_host {
            Some(host) => host.clone(),
            None => udp::detect_local_ip().to_string(),
        };

        let device = Arc::new(SimulatedDevice {
            device_id: config.device_id.clone(),
            kind,
            logic: Mutex::new(logic),
            advertise_host,
            announce_port: command_addr.map_or(config.port, |addr| addr.port()),
            telemetry_socket,
            telemetry_target: RwLock::new(config.telemetry_target),
        });

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(device.clone().answer_probes(discovery_socket)));
        tasks.push(tokio::spawn(
            device.clone().push_periodically(config.telemetry_interval()),
        ));
        if let Some(listener) = command_listener {
            tasks.push(tokio::spawn(device.clone().accept_commands(listener)));
        }

        info!(
            device_id = %device.device_id,
            kind = %kind,
            discovery = %discovery_addr,
            command = ?command_addr,
            "Simulated device started"
        );

        Ok(DeviceHandle {
            device,
            discovery_addr,
            command_addr,
            tasks,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Current reading of the device logic
    pub fn reading(&self) -> String {
        self.logic.lock().read()
    }

    pub fn telemetry_target(&self) -> Option<SocketAddr> {
        *self.telemetry_target.read()
    }

    fn announce(&self) -> Announce {
        Announce {
            device_id: self.device_id.clone(),
            host: self.advertise_host.clone(),
            port: self.announce_port,
            kind: self.kind,
            transport: Transport::Tcp,
        }
    }

    async fn answer_probes(self: Arc<Self>, socket: UdpSocket) {
        let mut buf = vec![0u8; MAX_FRAME_LEN + 1];

        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "Discovery receive failed");
                    tokio::time::sleep(udp::RECV_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let probe = match WireMessage::decode(&buf[..len]) {
                Ok(WireMessage::Probe(probe)) if probe.is_discovery_request() => probe,
                Ok(other) => {
                    debug!(%peer, message_type = other.type_name(), "Ignoring non-probe message");
                    continue;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Ignoring malformed probe");
                    continue;
                }
            };

            let telemetry = DeviceAddress::new(probe.gateway_host.clone(), probe.telemetry_port);
            match net::resolve(&telemetry).await {
                Ok(addr) => *self.telemetry_target.write() = Some(addr),
                Err(e) => warn!(error = %e, "Cannot resolve gateway telemetry address"),
            }

            let reply_to = DeviceAddress::new(probe.gateway_host, probe.response_port);
            if let Err(e) = self.send_announce(&reply_to).await {
                warn!(gateway = %reply_to, error = %e, "Failed to answer probe");
            }
        }
    }

    async fn send_announce(&self, reply_to: &DeviceAddress) -> Result<(), TransportError> {
        let addr = net::resolve(reply_to).await?;
        let frame = WireMessage::Announce(self.announce())
            .encode()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.telemetry_socket
            .send_to(&frame, addr)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        debug!(gateway = %addr, "Answered discovery probe");
        Ok(())
    }

    async fn push_periodically(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.push_telemetry().await;
        }
    }

    /// Push the current reading to the gateway, if one is known
    pub async fn push_telemetry(&self) {
        let Some(target) = self.telemetry_target() else {
            debug!(device_id = %self.device_id, "No gateway known yet, skipping telemetry");
            return;
        };

        let data = self.reading();
        let frame = match WireMessage::Telemetry(Telemetry {
            device_id: self.device_id.clone(),
            data: data.clone(),
        })
        .encode()
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode telemetry");
                return;
            }
        };

        match self.telemetry_socket.send_to(&frame, target).await {
            Ok(_) => debug!(%target, data = %data, "Telemetry sent"),
            Err(e) => warn!(%target, error = %e, "Failed to send telemetry"),
        }
    }

    async fn accept_commands(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let device = self.clone();
                    tokio::spawn(async move { device.handle_commands(stream, peer).await });
                }
                Err(e) => warn!(error = %e, "Failed to accept command connection"),
            }
        }
    }

    async fn handle_commands(&self, stream: TcpStream, peer: SocketAddr) {
        let mut reader = LineReader::new(stream, MAX_FRAME_LEN);

        loop {
            let change = match reader.next_frame().await {
                Ok(Some(frame)) if frame.is_empty() => continue,
                Ok(Some(frame)) => WireMessage::decode_state_change(frame),
                Ok(None) => break,
                Err(e) => {
                    warn!(%peer, error = %e, "Command connection failed");
                    break;
                }
            };

            let change = match change {
                Ok(change) => change,
                Err(e) => {
                    warn!(%peer, error = %e, "Ignoring malformed command");
                    continue;
                }
            };

            if change.device_id != self.device_id {
                warn!(%peer, device_id = %change.device_id, "Command addressed to another device");
                continue;
            }

            let applied = self.logic.lock().apply(&change.payload);
            match applied {
                Ok(()) => {
                    info!(device_id = %self.device_id, payload = %change.payload, "State changed");
                    self.push_telemetry().await;
                }
                Err(e) => warn!(device_id = %self.device_id, error = %e, "Rejected state change"),
            }
        }
    }
}

fn local_addr(socket: &UdpSocket, what: &'static str) -> Result<SocketAddr, DeviceError> {
    socket.local_addr().map_err(|e| DeviceError::Bind {
        what,
        reason: e.to_string(),
    })
}

/// A running simulated device
pub struct DeviceHandle {
    device: Arc<SimulatedDevice>,
    discovery_addr: SocketAddr,
    command_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl DeviceHandle {
    pub fn device(&self) -> &Arc<SimulatedDevice> {
        &self.device
    }

    /// Address probes are received on
    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery_addr
    }

    /// Address actuator commands are accepted on
    pub fn command_addr(&self) -> Option<SocketAddr> {
        self.command_addr
    }

    /// Stop every device task
    pub fn stop(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(device_id = %self.device.device_id, "Simulated device stopped");
    }
}
