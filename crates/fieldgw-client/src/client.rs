//! Gateway TCP client implementation

use std::net::SocketAddr;
use std::time::Duration;

use fieldgw_core::{ClientCommand, MAX_FRAME_LEN};
use fieldgw_transport::framing::{write_line, LineReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Default time to wait for a response
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client holding one connection to a gateway
///
/// Requests are sent one at a time; each waits for its response line.
pub struct GatewayClient {
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    timeout: Duration,
}

impl GatewayClient {
    /// Connect with default timeouts
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect with custom request and connection timeouts
    pub async fn connect_with_timeout(
        addr: impl ToSocketAddrs,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        let peer = stream.peer_addr()?;
        let (read_half, writer) = stream.into_split();

        debug!(%peer, "Connected to gateway");
        Ok(Self {
            reader: LineReader::new(read_half, MAX_FRAME_LEN),
            writer,
            peer,
            timeout,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one raw request line and return the response line
    pub async fn request(&mut self, line: &str) -> Result<String> {
        if line.contains('\n') {
            return Err(ClientError::InvalidRequest(
                "request must be a single line".into(),
            ));
        }

        debug!(peer = %self.peer, request = %line, "Sending request");
        write_line(&mut self.writer, line.as_bytes()).await?;

        let response = tokio::time::timeout(self.timeout, self.reader.next_line())
            .await
            .map_err(|_| ClientError::Timeout)??;

        response.ok_or(ClientError::Closed)
    }

    /// Send a parsed command
    pub async fn send(&mut self, command: &ClientCommand) -> Result<String> {
        self.request(&command.to_line()).await
    }

    /// Last known state of a device (or the gateway's error message)
    pub async fn get_state(&mut self, device_id: &str) -> Result<String> {
        check_field("device id", device_id)?;
        self.send(&ClientCommand::GetDeviceState {
            device_id: device_id.to_string(),
        })
        .await
    }

    /// Ask the gateway to change an actuator's state
    pub async fn set_state(&mut self, device_id: &str, payload: &str) -> Result<String> {
        check_field("device id", device_id)?;
        check_field("payload", payload)?;
        self.send(&ClientCommand::SetDeviceState {
            device_id: device_id.to_string(),
            payload: payload.to_string(),
        })
        .await
    }
}

/// Fields cannot carry the separator or a line break
fn check_field(name: &str, value: &str) -> Result<()> {
    if value.contains(['|', '\n', '\r']) {
        return Err(ClientError::InvalidRequest(format!(
            "{} must not contain '|' or line breaks",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    /// Gateway stand-in answering every line with `ECHO:<line>`
    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = format!("ECHO:{}\n", line);
                write_half.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn helpers_build_protocol_lines() {
        let mut client = GatewayClient::connect(echo_server().await).await.unwrap();

        assert_eq!(
            client.get_state("dev1").await.unwrap(),
            "ECHO:GET_DEVICE_STATE|dev1"
        );
        assert_eq!(
            client.set_state("dev1", "ON").await.unwrap(),
            "ECHO:SET_DEVICE_STATE|dev1|ON"
        );
        assert_eq!(client.request("BADCOMMAND").await.unwrap(), "ECHO:BADCOMMAND");
    }

    #[tokio::test]
    async fn separator_in_fields_is_rejected_locally() {
        let mut client = GatewayClient::connect(echo_server().await).await.unwrap();
        assert!(matches!(
            client.set_state("dev1", "a|b").await,
            Err(ClientError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.request("x\ny").await,
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn silent_gateway_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut client =
            GatewayClient::connect_with_timeout(addr, Duration::from_millis(100), DEFAULT_CONNECT_TIMEOUT)
                .await
                .unwrap();
        assert!(matches!(
            client.get_state("dev1").await,
            Err(ClientError::Timeout)
        ));
    }

    #[tokio::test]
    async fn closed_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = GatewayClient::connect(addr).await.unwrap();
        let result = client.get_state("dev1").await;
        assert!(
            matches!(result, Err(ClientError::Closed) | Err(ClientError::Transport(_))),
            "unexpected result: {:?}",
            result
        );
    }

    #[tokio::test]
    async fn refused_connection() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        assert!(matches!(
            GatewayClient::connect(addr).await,
            Err(ClientError::ConnectionFailed(_))
        ));
    }
}
