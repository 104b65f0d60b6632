use std::sync::Arc;

use tokio::sync::watch;

/// One-shot broadcast flag: once fired it stays fired.
///
/// Every clone observes the same state; waiters that subscribe after the
/// latch fired return immediately.
#[derive(Debug, Clone)]
pub struct Latch {
    tx: Arc<watch::Sender<bool>>,
}

/// Released once by the orchestrator to let every worker start together.
pub type StartGate = Latch;
/// Fired once by the orchestrator to end dequeuing.
pub type StopSignal = Latch;

impl Default for Latch {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl Latch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the call that actually flipped the latch.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _fired = rx.wait_for(|fired| *fired).await.is_ok();
    }
}
