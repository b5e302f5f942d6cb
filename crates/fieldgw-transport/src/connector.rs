//! Outbound device connector trait

use async_trait::async_trait;
use fieldgw_core::{DeviceAddress, Transport};

use super::TransportError;

/// Delivers one encoded frame to a device
///
/// Each call is a scoped acquisition: the implementation opens whatever
/// connection it needs, writes the frame, and releases the connection before
/// returning. Nothing is pooled between calls. `Ok(())` means the frame was
/// handed to the transport successfully; every call must complete (or fail)
/// within the implementation's configured bounds.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn deliver(
        &self,
        target: &DeviceAddress,
        transport: Transport,
        frame: &[u8],
    ) -> Result<(), TransportError>;
}
