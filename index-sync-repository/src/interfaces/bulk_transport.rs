//! Bulk transport trait definition.
//!
//! This module defines the abstract interface the synchronization pipeline
//! uses to reach the search engine, allowing for different backend
//! implementations (OpenSearch, Elasticsearch, in-memory mocks).

use async_trait::async_trait;

use crate::errors::SearchError;
use index_sync_shared::{BulkSummary, IndexOperation, RefreshSummary};

/// Abstract interface for bulk writes and index refreshes.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; a transport is shared between
/// the synchronization task and the batch accumulator's sender task.
///
/// # Error Handling
///
/// Both methods return a single aggregate outcome. Per-operation results of a
/// bulk write are not surfaced to callers.
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Submit an ordered batch of operations as one bulk write.
    ///
    /// # Arguments
    ///
    /// * `operations` - Operations in push order. Each one is sent as an
    ///   action line followed by its document body.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkSummary)` - If every operation was accepted
    /// * `Err(SearchError::BulkIndexError)` - If the request failed or any item failed
    async fn bulk(&self, operations: &[IndexOperation]) -> Result<BulkSummary, SearchError>;

    /// Refresh an index so recently written documents become searchable.
    ///
    /// # Arguments
    ///
    /// * `index` - The index name
    ///
    /// # Returns
    ///
    /// * `Ok(RefreshSummary)` - Shard counts reported by the engine
    /// * `Err(SearchError)` - If the refresh fails
    async fn refresh(&self, index: &str) -> Result<RefreshSummary, SearchError>;
}
