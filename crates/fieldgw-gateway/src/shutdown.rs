//! Cooperative shutdown signal shared by all gateway loops

use tokio::sync::watch;

/// Create a linked trigger/listener pair
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Sending half; firing it (or dropping it) stops every listener
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

/// Listening half, cloned into every task
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolve once shutdown has been requested
    ///
    /// Cancel-safe, so it can sit in a `select!` next to socket reads.
    pub async fn recv(&mut self) {
        // A closed channel means the trigger is gone: treat as shutdown.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[test]
    fn fire_wakes_all_listeners() {
        let (trigger, shutdown) = channel();
        let mut a = shutdown.clone();
        let mut b = shutdown.clone();
        let mut wait_a = task::spawn(a.recv());
        let mut wait_b = task::spawn(b.recv());

        assert_pending!(wait_a.poll());
        assert_pending!(wait_b.poll());

        trigger.fire();

        assert!(wait_a.is_woken());
        assert_ready!(wait_a.poll());
        assert_ready!(wait_b.poll());
    }

    #[test]
    fn listener_cloned_after_fire_sees_it() {
        let (trigger, shutdown) = channel();
        trigger.fire();

        let mut late = shutdown.clone();
        assert_ready!(task::spawn(late.recv()).poll());
    }

    #[tokio::test]
    async fn dropped_trigger_counts_as_shutdown() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), shutdown.recv())
            .await
            .unwrap();
    }
}
