//! Dependency initialization and wiring for the synchronizer.

use std::sync::Arc;
use tracing::info;

use super::Settings;
use crate::source::JsonLinesSource;
use crate::IndexingError;
use index_sync_pipeline::Synchronizer;
use index_sync_repository::OpenSearchClient;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured synchronizer ready to run.
    pub synchronizer: Synchronizer,
}

impl Dependencies {
    /// Initialize all dependencies from settings.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the search engine is unreachable or the
    ///   settings do not resolve to a usable index
    pub async fn new(settings: &Settings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            collection = %settings.collection,
            source_path = %settings.source_path.display(),
            "Initializing dependencies"
        );

        // Initialize OpenSearch client
        let search_client = OpenSearchClient::new(&settings.opensearch_url)
            .await
            .map_err(|e| IndexingError::config(format!("Failed to create OpenSearch client: {}", e)))?;

        // Verify OpenSearch is reachable
        let healthy = search_client
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let source = JsonLinesSource::new(settings.source_path.clone());

        let synchronizer = Synchronizer::new(
            Arc::new(search_client),
            Arc::new(source),
            settings.sync_options(),
        )?;

        info!(index = %synchronizer.index(), "Synchronizer created");

        Ok(Self { synchronizer })
    }
}
