//! Discovery engine
//!
//! Runs the periodic probe/listen cycle:
//!
//! ```text
//! Idle --(timer)--> Probing --(probe sent or failed)--> Listening --(deadline)--> Idle
//! ```
//!
//! The listen window always ends on its wall-clock deadline, whatever the
//! number of announcements received, so a silent network can never delay
//! the next cycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fieldgw_core::{DeviceRegistry, DiscoveryProbe, WireMessage, MAX_FRAME_LEN};
use fieldgw_transport::udp;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DiscoveryConfig};
use crate::shutdown::Shutdown;

/// Current phase of the discovery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Probing,
    Listening,
}

/// Outcome of one discovery cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub probe_sent: bool,
    /// Announcements upserted into the registry
    pub accepted: usize,
    /// Of those, ids that were not known before
    pub new_devices: usize,
    /// Malformed or unexpected datagrams
    pub dropped: usize,
}

/// Probe/listen state machine feeding the device registry
pub struct DiscoveryEngine {
    registry: Arc<DeviceRegistry>,
    probe_socket: UdpSocket,
    response_socket: UdpSocket,
    group: SocketAddr,
    probe: Vec<u8>,
    interval: Duration,
    listen_window: Duration,
    state: RwLock<DiscoveryState>,
}

impl DiscoveryEngine {
    /// Bind the probe and announcement sockets
    ///
    /// `telemetry_port` is advertised in every probe so devices know where to
    /// push their state.
    pub fn bind(
        config: &DiscoveryConfig,
        registry: Arc<DeviceRegistry>,
        telemetry_port: u16,
    ) -> Result<Self, ConfigError> {
        let response_socket = udp::bind_multicast(
            config.response_addr(),
            config.multicast_group,
            config.multicast_interface,
        )
        .map_err(|e| ConfigError::Bind {
            what: "discovery response socket",
            reason: e.to_string(),
        })?;
        let response_port = response_socket
            .local_addr()
            .map_err(|e| ConfigError::Bind {
                what: "discovery response socket",
                reason: e.to_string(),
            })?
            .port();

        let probe_socket = udp::multicast_sender(config.multicast_ttl, config.multicast_interface)
            .map_err(|e| ConfigError::Bind {
                what: "discovery probe socket",
                reason: e.to_string(),
            })?;

        let host = match &config.advertise_host {
            Some(host) => host.clone(),
            None => udp::detect_local_ip().to_string(),
        };
        let probe = WireMessage::Probe(DiscoveryProbe::new(&host, response_port, telemetry_port))
            .encode()
            .map_err(|e| ConfigError::Invalid(format!("discovery probe: {}", e)))?;

        info!(
            group = %config.group_addr(),
            advertise = %host,
            response_port,
            telemetry_port,
            "Discovery engine bound"
        );

        Ok(Self {
            registry,
            probe_socket,
            response_socket,
            group: config.group_addr(),
            probe,
            interval: config.interval(),
            listen_window: config.listen_window(),
            state: RwLock::new(DiscoveryState::Idle),
        })
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.read()
    }

    /// Address announcements are received on
    pub fn response_addr(&self) -> std::io::Result<SocketAddr> {
        self.response_socket.local_addr()
    }

    fn set_state(&self, state: DiscoveryState) {
        *self.state.write() = state;
    }

    /// Run cycles on the discovery interval until shutdown
    pub async fn run(&self, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            let stats = tokio::select! {
                _ = shutdown.recv() => break,
                stats = self.run_cycle() => stats,
            };

            debug!(
                probe_sent = stats.probe_sent,
                accepted = stats.accepted,
                new_devices = stats.new_devices,
                dropped = stats.dropped,
                known = self.registry.len(),
                "Discovery cycle complete"
            );
        }

        self.set_state(DiscoveryState::Idle);
        debug!("Discovery engine stopped");
    }

    /// One probe followed by one bounded listen window
    pub async fn run_cycle(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        self.set_state(DiscoveryState::Probing);
        match self.probe_socket.send_to(&self.probe, self.group).await {
            Ok(_) => {
                stats.probe_sent = true;
                debug!(group = %self.group, "Sent discovery probe");
            }
            Err(e) => warn!(group = %self.group, error = %e, "Failed to send discovery probe"),
        }

        self.set_state(DiscoveryState::Listening);
        let deadline = Instant::now() + self.listen_window;
        // One extra byte so an oversized datagram is detected, not truncated silently
        let mut buf = vec![0u8; MAX_FRAME_LEN + 1];

        loop {
            match tokio::time::timeout_at(deadline, self.response_socket.recv_from(&mut buf)).await
            {
                Err(_) => break,
                Ok(Ok((len, peer))) => self.handle_datagram(&buf[..len], peer, &mut stats),
                Ok(Err(e)) => {
                    warn!(error = %e, "Discovery receive failed");
                    let pause = (Instant::now() + udp::RECV_ERROR_BACKOFF).min(deadline);
                    tokio::time::sleep_until(pause).await;
                }
            }
        }

        self.set_state(DiscoveryState::Idle);
        stats
    }

    fn handle_datagram(&self, frame: &[u8], peer: SocketAddr, stats: &mut CycleStats) {
        let mut announce = match WireMessage::decode(frame) {
            Ok(WireMessage::Announce(announce)) => announce,
            Ok(WireMessage::Probe(_)) => {
                debug!(%peer, "Ignoring looped-back discovery probe");
                return;
            }
            Ok(other) => {
                warn!(%peer, message_type = other.type_name(), "Unexpected message on discovery socket");
                stats.dropped += 1;
                return;
            }
            Err(e) => {
                warn!(%peer, error = %e, "Dropping malformed discovery response");
                stats.dropped += 1;
                return;
            }
        };

        if announce.device_id.is_empty() {
            warn!(%peer, "Dropping discovery response without device id");
            stats.dropped += 1;
            return;
        }

        // Devices that leave the host out are reachable at their source address
        if announce.host.is_empty() {
            announce.host = peer.ip().to_string();
        }

        let is_new = self.registry.upsert(
            &announce.device_id,
            announce.address(),
            announce.kind,
            announce.transport,
        );
        stats.accepted += 1;

        if is_new {
            stats.new_devices += 1;
            info!(
                device_id = %announce.device_id,
                address = %announce.address(),
                kind = %announce.kind,
                transport = %announce.transport,
                "Discovered device"
            );
        } else {
            debug!(device_id = %announce.device_id, address = %announce.address(), "Refreshed device");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use fieldgw_core::{Announce, DeviceKind, Transport};

    use super::*;

    /// A device socket on loopback standing in for the multicast group
    async fn fake_device() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    fn config_for(device: &UdpSocket, window_ms: u64) -> DiscoveryConfig {
        DiscoveryConfig {
            multicast_group: Ipv4Addr::LOCALHOST,
            multicast_port: device.local_addr().unwrap().port(),
            bind: Ipv4Addr::LOCALHOST.into(),
            response_port: 0,
            interval_ms: window_ms * 4,
            listen_window_ms: window_ms,
            advertise_host: Some("127.0.0.1".into()),
            ..Default::default()
        }
    }

    async fn recv_probe(device: &UdpSocket) -> DiscoveryProbe {
        let mut buf = [0u8; 2048];
        let (len, _) = device.recv_from(&mut buf).await.unwrap();
        match WireMessage::decode(&buf[..len]).unwrap() {
            WireMessage::Probe(probe) => probe,
            other => panic!("expected probe, got {:?}", other),
        }
    }

    fn announce(id: &str, port: u16, kind: DeviceKind) -> Vec<u8> {
        WireMessage::Announce(Announce {
            device_id: id.into(),
            host: "10.0.0.5".into(),
            port,
            kind,
            transport: Transport::Tcp,
        })
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn probe_advertises_bound_ports() {
        let device = fake_device().await;
        let registry = Arc::new(DeviceRegistry::new());
        let engine = DiscoveryEngine::bind(&config_for(&device, 50), registry, 8888).unwrap();
        let response_port = engine.response_addr().unwrap().port();

        let (stats, probe) = tokio::join!(engine.run_cycle(), recv_probe(&device));

        assert!(stats.probe_sent);
        assert!(probe.is_discovery_request());
        assert_eq!(probe.gateway_host, "127.0.0.1");
        assert_eq!(probe.response_port, response_port);
        assert_eq!(probe.telemetry_port, 8888);
    }

    #[tokio::test]
    async fn announcements_are_upserted_and_garbage_is_dropped() {
        let device = fake_device().await;
        let registry = Arc::new(DeviceRegistry::new());
        let engine =
            DiscoveryEngine::bind(&config_for(&device, 300), registry.clone(), 8888).unwrap();

        let responder = async {
            let probe = recv_probe(&device).await;
            let gateway = SocketAddr::from((Ipv4Addr::LOCALHOST, probe.response_port));
            device.send_to(b"not json", gateway).await.unwrap();
            device
                .send_to(&announce("dev1", 9000, DeviceKind::Actuator), gateway)
                .await
                .unwrap();
            // Duplicate within the same window
            device
                .send_to(&announce("dev1", 9000, DeviceKind::Actuator), gateway)
                .await
                .unwrap();
            device
                .send_to(&announce("temp", 9001, DeviceKind::Sensor), gateway)
                .await
                .unwrap();
        };

        let (stats, ()) = tokio::join!(engine.run_cycle(), responder);

        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.new_devices, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(registry.len(), 2);

        let dev1 = registry.lookup("dev1").unwrap();
        assert_eq!(dev1.kind, DeviceKind::Actuator);
        assert_eq!(dev1.address.to_string(), "10.0.0.5:9000");
        assert_eq!(dev1.last_state, "");
        assert!(registry.lookup("temp").unwrap().kind.is_sensor());
        assert_eq!(engine.state(), DiscoveryState::Idle);
    }

    #[tokio::test]
    async fn empty_host_falls_back_to_sender_address() {
        let device = fake_device().await;
        let registry = Arc::new(DeviceRegistry::new());
        let engine =
            DiscoveryEngine::bind(&config_for(&device, 200), registry.clone(), 8888).unwrap();

        let responder = async {
            let probe = recv_probe(&device).await;
            let gateway = SocketAddr::from((Ipv4Addr::LOCALHOST, probe.response_port));
            let raw = br#"{"type":"announce","device_id":"anon","host":"","port":7000,"kind":0}"#;
            device.send_to(raw, gateway).await.unwrap();
        };
        tokio::join!(engine.run_cycle(), responder);

        assert_eq!(
            registry.lookup("anon").unwrap().address.to_string(),
            "127.0.0.1:7000"
        );
    }

    #[tokio::test]
    async fn failed_probe_still_opens_the_window() {
        let device = fake_device().await;
        let registry = Arc::new(DeviceRegistry::new());
        // Broadcast without SO_BROADCAST: the probe send is refused
        let config = DiscoveryConfig {
            multicast_group: Ipv4Addr::BROADCAST,
            multicast_port: 9,
            ..config_for(&device, 200)
        };
        let engine = DiscoveryEngine::bind(&config, registry.clone(), 8888).unwrap();
        let gateway = engine.response_addr().unwrap();

        let started = Instant::now();
        let responder = async {
            device
                .send_to(&announce("dev1", 9000, DeviceKind::Actuator), gateway)
                .await
                .unwrap();
        };
        let (stats, ()) = tokio::join!(engine.run_cycle(), responder);

        assert!(!stats.probe_sent);
        assert_eq!(stats.accepted, 1);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(registry.lookup("dev1").is_some());
        assert_eq!(engine.state(), DiscoveryState::Idle);
    }

    #[tokio::test]
    async fn silent_window_ends_on_deadline() {
        let device = fake_device().await;
        let registry = Arc::new(DeviceRegistry::new());
        let engine = DiscoveryEngine::bind(&config_for(&device, 100), registry.clone(), 8888).unwrap();

        let started = Instant::now();
        let stats = tokio::time::timeout(Duration::from_secs(2), engine.run_cycle())
            .await
            .expect("listen window must close on its deadline");

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(stats.accepted, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let device = fake_device().await;
        let registry = Arc::new(DeviceRegistry::new());
        let engine = Arc::new(
            DiscoveryEngine::bind(&config_for(&device, 50), registry, 8888).unwrap(),
        );
        let (trigger, shutdown) = crate::shutdown::channel();

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(shutdown).await }
        });

        // The first tick fires immediately
        recv_probe(&device).await;
        trigger.fire();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.state(), DiscoveryState::Idle);
    }
}
