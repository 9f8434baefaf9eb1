//! # Index Sync Pipeline
//!
//! This crate provides the components that copy a document collection into a
//! search index.
//!
//! ## Architecture
//!
//! The pipeline follows a Source-Serializer-Bulker pattern:
//!
//! 1. **Source**: Streams records out of a collection, one page at a time
//! 2. **Serializer**: Turns records into document bodies using the field mapping
//! 3. **Bulker**: Buffers index operations and flushes them as bulk writes
//! 4. **Synchronizer**: Coordinates the flow, applies backpressure and refreshes the index

pub mod bulker;
pub mod errors;
pub mod options;
pub mod serializer;
pub mod source;
pub mod synchronizer;

pub use bulker::{BulkEvent, BulkSubscription, Bulker};
pub use errors::SyncError;
pub use options::{BulkOptions, Environment, SyncOptions};
pub use serializer::{FieldMapping, FieldProperty, MappingSerializer, Serializer};
pub use source::{
    paged_cursor, Filter, FindOptions, MemorySource, PreparedQuery, Projection, RecordCursor,
    RecordSource, SortDirection, SyncQuery,
};
pub use synchronizer::{SyncEvent, SyncListener, SyncReport, Synchronizer, TracingListener};
