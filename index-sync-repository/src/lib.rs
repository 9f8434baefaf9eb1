//! # Index Sync Repository
//!
//! This crate provides the transport used to write batches into the search
//! engine and refresh the target index. It includes the error type, the
//! `BulkTransport` trait, and a concrete implementation for OpenSearch.

pub mod errors;
pub mod interfaces;
pub mod opensearch;

pub use errors::SearchError;
pub use interfaces::BulkTransport;
pub use opensearch::OpenSearchClient;
