//! UDP and multicast socket setup
//!
//! Discovery and telemetry sockets are built with `socket2` so address reuse
//! and multicast membership can be set before binding, then handed to tokio.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::TransportError;

/// Pause after a failed receive so a persistent socket error cannot spin
pub const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

fn bind_error(addr: SocketAddr, e: std::io::Error) -> TransportError {
    TransportError::Bind {
        addr: addr.to_string(),
        reason: e.to_string(),
    }
}

fn new_udp_socket(addr: SocketAddr) -> Result<Socket, TransportError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket =
        Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| bind_error(addr, e))?;
    socket.set_reuse_address(true).map_err(|e| bind_error(addr, e))?;
    socket.set_nonblocking(true).map_err(|e| bind_error(addr, e))?;
    Ok(socket)
}

fn into_tokio(socket: Socket, addr: SocketAddr) -> Result<UdpSocket, TransportError> {
    UdpSocket::from_std(socket.into()).map_err(|e| bind_error(addr, e))
}

/// Bind a UDP socket with `SO_REUSEADDR` set
pub fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, TransportError> {
    let socket = new_udp_socket(addr)?;
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| bind_error(addr, e))?;
    into_tokio(socket, addr)
}

/// Bind a UDP socket and join `group` on `interface`
///
/// If `group` is not a multicast address the socket is bound without any
/// membership, so point-to-point setups (and loopback tests) work unchanged.
/// A failed join is logged and the bound socket is still returned.
pub fn bind_multicast(
    addr: SocketAddr,
    group: Ipv4Addr,
    interface: Ipv4Addr,
) -> Result<UdpSocket, TransportError> {
    let socket = new_udp_socket(addr)?;
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| bind_error(addr, e))?;

    // Membership failures are non-fatal: the socket still receives
    // point-to-point datagrams on its port.
    if group.is_multicast() {
        match socket.join_multicast_v4(&group, &interface) {
            Ok(()) => debug!(%group, %interface, %addr, "Joined multicast group"),
            Err(e) => warn!(%group, %interface, error = %e, "Failed to join multicast group"),
        }
        let _ = socket.set_multicast_loop_v4(true);
    } else {
        debug!(%group, %addr, "Not a multicast group, bound without membership");
    }

    into_tokio(socket, addr)
}

/// Socket for sending datagrams to a multicast group
pub fn multicast_sender(ttl: u32, interface: Ipv4Addr) -> Result<UdpSocket, TransportError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    let socket = new_udp_socket(addr)?;
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| bind_error(addr, e))?;
    socket
        .set_multicast_ttl_v4(ttl)
        .map_err(|e| bind_error(addr, e))?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(|e| bind_error(addr, e))?;
    if !interface.is_unspecified() {
        socket
            .set_multicast_if_v4(&interface)
            .map_err(|e| bind_error(addr, e))?;
    }
    into_tokio(socket, addr)
}

/// Best-effort detection of the address other hosts can reach us on
///
/// Connecting a UDP socket sends nothing; it only asks the kernel which
/// local address it would route through. Falls back to loopback.
pub fn detect_local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            warn!(error = %e, "Could not detect local address, advertising loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_multicast_with_unicast_group_is_plain_bind() {
        let socket = bind_multicast(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::UNSPECIFIED,
        )
        .unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn bound_sockets_exchange_datagrams() {
        let a = bind_udp(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let b = bind_udp(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();

        a.send_to(b"hi", b.local_addr().unwrap()).await.unwrap();
        let mut buf = [0u8; 8];
        let (n, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi");
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[test]
    fn detected_ip_is_specified() {
        assert!(!detect_local_ip().is_unspecified());
    }
}
