//! Socket-backed connector

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use fieldgw_core::{DeviceAddress, Transport};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

use crate::config::ConnectorConfig;
use crate::{DeviceConnector, TransportError};

/// Connector that opens a fresh TCP connection (or UDP socket) per delivery
#[derive(Debug, Clone)]
pub struct NetConnector {
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl NetConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    async fn deliver_tcp(&self, target: &DeviceAddress, frame: &[u8]) -> Result<(), TransportError> {
        let mut stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        .map_err(|_| {
            TransportError::Timeout(format!(
                "connect to {} exceeded {}ms",
                target,
                self.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", target, e)))?;

        let write = async {
            stream.write_all(frame).await?;
            stream.flush().await?;
            stream.shutdown().await
        };

        tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "write to {} exceeded {}ms",
                    target,
                    self.write_timeout.as_millis()
                ))
            })?
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", target, e)))?;

        debug!(%target, bytes = frame.len(), "Delivered frame over TCP");
        Ok(())
    }

    async fn deliver_udp(&self, target: &DeviceAddress, frame: &[u8]) -> Result<(), TransportError> {
        let addr = tokio::time::timeout(self.connect_timeout, resolve(target))
            .await
            .map_err(|_| TransportError::Timeout(format!("resolving {}", target)))??;

        let local: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await.map_err(|e| TransportError::Bind {
            addr: local.to_string(),
            reason: e.to_string(),
        })?;

        let sent = tokio::time::timeout(self.write_timeout, socket.send_to(frame, addr))
            .await
            .map_err(|_| TransportError::Timeout(format!("send to {}", target)))?
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", target, e)))?;

        if sent != frame.len() {
            return Err(TransportError::SendFailed(format!(
                "short datagram to {}: {} of {} bytes",
                target,
                sent,
                frame.len()
            )));
        }

        debug!(%target, bytes = sent, "Delivered frame over UDP");
        Ok(())
    }
}

#[async_trait]
impl DeviceConnector for NetConnector {
    async fn deliver(
        &self,
        target: &DeviceAddress,
        transport: Transport,
        frame: &[u8],
    ) -> Result<(), TransportError> {
        if target.is_unroutable() {
            return Err(TransportError::ConnectionFailed(format!(
                "device address {} is not routable",
                target
            )));
        }

        match transport {
            Transport::Tcp => self.deliver_tcp(target, frame).await,
            Transport::Udp => self.deliver_udp(target, frame).await,
        }
    }
}

/// Resolve a device address to its first socket address
pub async fn resolve(target: &DeviceAddress) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|e| TransportError::Resolve(format!("{}: {}", target, e)))?
        .next()
        .ok_or_else(|| TransportError::Resolve(format!("{}: no addresses", target)))
}
