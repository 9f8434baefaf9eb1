//! Aggregate outcomes reported by the search engine.

use serde::{Deserialize, Serialize};

/// Aggregate outcome of one bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    /// Number of operations in the request.
    pub total: usize,
    /// Time the engine spent on the request, in milliseconds.
    pub took_ms: u64,
}

/// Outcome of an index refresh, taken from the `_shards` section of the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    /// Shards the refresh was sent to.
    pub total: u64,
    /// Shards that refreshed successfully.
    pub successful: u64,
    /// Shards that failed to refresh.
    pub failed: u64,
}
