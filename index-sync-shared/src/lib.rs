//! # Index Sync Shared
//!
//! Plain data types shared by the repository, pipeline and binary crates:
//! source records, bulk index operations and the aggregate outcomes
//! reported by the search engine.

mod operation;
mod record;
mod summary;

pub use operation::{ActionHeader, IndexOperation, OperationKind};
pub use record::Record;
pub use summary::{BulkSummary, RefreshSummary};
