//! Shutdown coordination.

use tokio::sync::watch;

/// One-shot shutdown signal shared by the accept loop and its owner.
///
/// Built on a watch channel, so a subscriber that arrives after the trigger
/// still observes it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Triggering twice is harmless.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once `rx` has seen the trigger (or its sender is gone).
pub async fn triggered(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|triggered| *triggered).await;
}
