//! Error types for gateway client operations

use fieldgw_transport::TransportError;
use thiserror::Error;

/// Result type alias for gateway client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to a gateway
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the gateway
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// IO error on an established connection
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Framing or send failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The gateway closed the connection before answering
    #[error("Connection closed by gateway")]
    Closed,

    /// No response within the request timeout
    #[error("Request timed out")]
    Timeout,

    /// Request cannot be expressed in the line protocol
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
