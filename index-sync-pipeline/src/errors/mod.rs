//! Error types for the synchronization pipeline.

use index_sync_repository::SearchError;
use thiserror::Error;

/// Errors that can end a synchronization run.
///
/// Failed bulk writes are reported to listeners instead; only configuration
/// problems, source failures and a failed final refresh end a run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The record source failed to open or to produce a record.
    #[error("Source error: {0}")]
    SourceError(String),

    /// Error from the search engine.
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),
}

impl SyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a source error.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::SourceError(msg.into())
    }
}
