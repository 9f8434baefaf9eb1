//! # Index Sync
//!
//! Main library for synchronizing a document collection into a search index.
//!
//! This crate provides the entry point, configuration and record source for
//! running one synchronization from an exported collection.

pub mod config;
pub mod source;

pub use config::{Dependencies, Settings};
pub use source::JsonLinesSource;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Synchronization error.
    #[error("Sync error: {0}")]
    SyncError(#[from] index_sync_pipeline::SyncError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] index_sync_repository::SearchError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
