//! Outcome notifications emitted by the batch accumulator.

use std::sync::Weak;

use tokio::sync::mpsc;

use super::Inner;
use index_sync_repository::SearchError;

/// Outcome of one flushed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkEvent {
    /// The bulk write succeeded.
    Sent {
        /// Batch number assigned at flush time.
        batch: u64,
        /// Number of operations in the batch.
        count: usize,
    },
    /// The bulk write failed. The operations are not retried.
    Error {
        batch: u64,
        count: usize,
        error: SearchError,
    },
}

impl BulkEvent {
    /// Batch number this outcome belongs to.
    pub fn batch(&self) -> u64 {
        match self {
            BulkEvent::Sent { batch, .. } | BulkEvent::Error { batch, .. } => *batch,
        }
    }
}

/// A listener attached to a `Bulker`. Dropping it detaches the listener.
pub struct BulkSubscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<BulkEvent>,
    bulker: Weak<Inner>,
}

impl BulkSubscription {
    pub(super) fn new(
        id: u64,
        receiver: mpsc::UnboundedReceiver<BulkEvent>,
        bulker: Weak<Inner>,
    ) -> Self {
        Self {
            id,
            receiver,
            bulker,
        }
    }

    /// Wait for the next outcome. Returns `None` once the accumulator is gone
    /// and every delivered event has been read.
    pub async fn recv(&mut self) -> Option<BulkEvent> {
        self.receiver.recv().await
    }

    /// Take an already delivered outcome without waiting.
    pub fn try_recv(&mut self) -> Option<BulkEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for BulkSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bulker.upgrade() {
            inner.detach(self.id);
        }
    }
}
