//! Mock connector for testing

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fieldgw_core::{DeviceAddress, Transport};
use parking_lot::RwLock;

use crate::config::MockConfig;
use crate::{DeviceConnector, TransportError};

/// A frame handed to the mock connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub target: DeviceAddress,
    pub transport: Transport,
    pub frame: Vec<u8>,
}

/// In-memory connector that records deliveries instead of sending them
pub struct MockConnector {
    config: MockConfig,
    reachable: AtomicBool,
    /// Targets that always fail, regardless of `reachable`
    unreachable_targets: RwLock<HashSet<DeviceAddress>>,
    deliveries: RwLock<Vec<Delivery>>,
}

impl MockConnector {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            config: config.clone(),
            reachable: AtomicBool::new(!config.unreachable),
            unreachable_targets: RwLock::new(HashSet::new()),
            deliveries: RwLock::new(Vec::new()),
        }
    }

    /// Make every delivery succeed (`true`) or fail (`false`)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make deliveries to one address fail
    pub fn fail_target(&self, target: DeviceAddress) {
        self.unreachable_targets.write().insert(target);
    }

    /// Frames delivered so far, oldest first
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.read().clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new(&MockConfig::default())
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn deliver(
        &self,
        target: &DeviceAddress,
        transport: Transport,
        frame: &[u8],
    ) -> Result<(), TransportError> {
        // Simulate latency
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if !self.reachable.load(Ordering::SeqCst) || self.unreachable_targets.read().contains(target)
        {
            return Err(TransportError::ConnectionFailed(format!(
                "{}: mock device unreachable",
                target
            )));
        }

        tracing::debug!(%target, %transport, bytes = frame.len(), "Mock connector: delivered frame");
        self.deliveries.write().push(Delivery {
            target: target.clone(),
            transport,
            frame: frame.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_successful_deliveries() {
        let mock = MockConnector::default();
        let target = DeviceAddress::new("10.0.0.5", 9000);
        mock.deliver(&target, Transport::Tcp, b"frame").await.unwrap();

        let deliveries = mock.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].target, target);
        assert_eq!(deliveries[0].frame, b"frame");
    }

    #[tokio::test]
    async fn unreachable_fails_without_recording() {
        let mock = MockConnector::new(&MockConfig {
            latency_ms: 0,
            unreachable: true,
        });
        let target = DeviceAddress::new("10.0.0.5", 9000);
        assert!(mock.deliver(&target, Transport::Tcp, b"x").await.is_err());
        assert!(mock.deliveries().is_empty());

        mock.set_reachable(true);
        assert!(mock.deliver(&target, Transport::Tcp, b"x").await.is_ok());
    }

    #[tokio::test]
    async fn per_target_failure() {
        let mock = MockConnector::default();
        let bad = DeviceAddress::new("10.0.0.6", 9000);
        mock.fail_target(bad.clone());

        assert!(mock.deliver(&bad, Transport::Tcp, b"x").await.is_err());
        assert!(mock
            .deliver(&DeviceAddress::new("10.0.0.5", 9000), Transport::Tcp, b"x")
            .await
            .is_ok());
    }
}
