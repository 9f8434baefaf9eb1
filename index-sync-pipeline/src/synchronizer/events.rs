//! Notifications emitted while a synchronization run is in progress.

use tracing::{debug, error, info};

use index_sync_repository::SearchError;
use index_sync_shared::Record;

/// Something observable happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A bulk write failed. The run keeps going.
    BulkError { batch: u64, error: SearchError },
    /// A bulk write succeeded.
    BulkSent { batch: u64, count: usize },
    /// A record was queued for indexing.
    BulkData(Record),
    /// A record was rejected by the filter.
    BulkFiltered(Record),
}

/// Observer for `SyncEvent`s.
///
/// Listeners are called from the synchronization task and should return quickly.
pub trait SyncListener: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

impl<F> SyncListener for F
where
    F: Fn(&SyncEvent) + Send + Sync,
{
    fn on_event(&self, event: &SyncEvent) {
        self(event)
    }
}

/// Default listener: writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl SyncListener for TracingListener {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::BulkError { batch, error } => {
                error!(batch = batch, error = %error, "Bulk write failed")
            }
            SyncEvent::BulkSent { batch, count } => {
                info!(batch = batch, count = count, "Bulk sent")
            }
            SyncEvent::BulkData(record) => {
                debug!(id = ?record.id(), "Record queued")
            }
            SyncEvent::BulkFiltered(record) => {
                debug!(id = ?record.id(), "Record filtered")
            }
        }
    }
}
