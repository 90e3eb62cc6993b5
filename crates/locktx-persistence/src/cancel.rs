//! Cancellation signal for coordinated transactions
//!
//! A `CancelSignal` can be attached to a transaction through
//! [`with_cancel_signal`](crate::options::with_cancel_signal). Firing it
//! unblocks whatever database round-trip the transaction is waiting on.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable, level-triggered cancellation flag
///
/// Once cancelled it stays cancelled; every clone observes the same state.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger cancellation
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once the signal has been cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` to completion unless the signal fires first
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
