//! End-to-end test support for the field device gateway
//!
//! Every test starts a real gateway on loopback with ephemeral ports. The
//! discovery "multicast group" is a plain UDP socket owned by the test (or a
//! simulated device), so no multicast routing is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p fieldgw-tests
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use fieldgw_core::{
    Announce, DeviceKind, DeviceRegistry, DiscoveryProbe, StateChange, Transport, WireMessage,
    MAX_FRAME_LEN,
};
use fieldgw_gateway::{Gateway, GatewayConfig, GatewayHandle};
use fieldgw_transport::framing::LineReader;
use fieldgw_transport::{create_connector, ConnectorConfig};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Gateway config bound to loopback, probing `group_port` on 127.0.0.1
pub fn loopback_config(group_port: u16) -> GatewayConfig {
    let lo = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let mut config = GatewayConfig::default();
    config.client.bind = lo;
    config.client.port = 0;
    config.telemetry.bind = lo;
    config.telemetry.port = 0;
    config.discovery.bind = lo;
    config.discovery.response_port = 0;
    config.discovery.multicast_group = Ipv4Addr::LOCALHOST;
    config.discovery.multicast_port = group_port;
    config.discovery.advertise_host = Some("127.0.0.1".into());
    config.discovery.interval_ms = 300;
    config.discovery.listen_window_ms = 200;
    config.actuator = ConnectorConfig {
        connect_timeout_ms: 500,
        write_timeout_ms: 500,
        mock: None,
    };
    config
}

/// Start a gateway with the socket-backed connector from `config`
pub async fn start_gateway(config: GatewayConfig) -> GatewayHandle {
    let connector = create_connector(&config.actuator);
    Gateway::start(config, connector)
        .await
        .expect("gateway should start on loopback")
}

/// Poll `check` until it holds or [`WAIT`] elapses
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Wait until `id` has been discovered
pub async fn wait_discovered(registry: &DeviceRegistry, id: &str) {
    assert!(
        eventually(|| registry.lookup(id).is_some()).await,
        "device {} was never discovered",
        id
    );
}

/// Test-owned socket standing in for the discovery multicast group
pub struct FakeGroup {
    socket: UdpSocket,
}

impl FakeGroup {
    pub async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.expect("bind fake group"),
        }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().expect("local addr").port()
    }

    /// Next probe sent by the gateway
    pub async fn next_probe(&self) -> DiscoveryProbe {
        let mut buf = vec![0u8; MAX_FRAME_LEN + 1];
        loop {
            let (len, _) = tokio::time::timeout(WAIT, self.socket.recv_from(&mut buf))
                .await
                .expect("no probe within timeout")
                .expect("recv probe");
            if let Ok(WireMessage::Probe(probe)) = WireMessage::decode(&buf[..len]) {
                return probe;
            }
        }
    }

    /// Reply to `probe` with raw bytes
    pub async fn reply_raw(&self, probe: &DiscoveryProbe, bytes: &[u8]) {
        let gateway = SocketAddr::new(
            probe.gateway_host.parse().expect("gateway host is an IP"),
            probe.response_port,
        );
        self.socket.send_to(bytes, gateway).await.expect("send reply");
    }

    /// Reply to `probe` announcing one device
    pub async fn announce(&self, probe: &DiscoveryProbe, id: &str, port: u16, kind: DeviceKind) {
        let announce = WireMessage::Announce(Announce {
            device_id: id.into(),
            host: "127.0.0.1".into(),
            port,
            kind,
            transport: Transport::Tcp,
        });
        self.reply_raw(probe, &announce.encode().expect("encode announce"))
            .await;
    }
}

/// TCP listener standing in for an actuator, reporting every state change
pub struct FakeActuator {
    addr: SocketAddr,
    changes: mpsc::UnboundedReceiver<StateChange>,
}

impl FakeActuator {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind actuator");
        let addr = listener.local_addr().expect("local addr");
        let (tx, changes) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut reader = LineReader::new(stream, MAX_FRAME_LEN);
                    while let Ok(Some(frame)) = reader.next_frame().await {
                        if let Ok(change) = WireMessage::decode_state_change(frame) {
                            let _ = tx.send(change);
                        }
                    }
                });
            }
        });

        Self { addr, changes }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn next_change(&mut self) -> StateChange {
        tokio::time::timeout(WAIT, self.changes.recv())
            .await
            .expect("no state change within timeout")
            .expect("actuator channel closed")
    }
}

/// A loopback port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

/// Wait until `id` reports `expected` as its last state
pub async fn wait_state(registry: &DeviceRegistry, id: &str, expected: &str) -> bool {
    eventually(|| registry.lookup(id).map(|d| d.last_state).as_deref() == Some(expected)).await
}
