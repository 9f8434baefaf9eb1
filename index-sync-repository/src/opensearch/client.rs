//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `BulkTransport`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::IndicesRefreshParts,
    BulkParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::errors::SearchError;
use crate::interfaces::BulkTransport;
use crate::opensearch::responses::{parse_bulk_response, parse_refresh_response};
use index_sync_shared::{BulkSummary, IndexOperation, RefreshSummary};

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// let client = OpenSearchClient::new("http://localhost:9200").await?;
/// let ops = vec![IndexOperation::index("cats", "1", json!({ "name": "Felix" }))];
/// client.bulk(&ops).await?;
/// client.refresh("cats").await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If connection setup fails
    pub async fn new(url: &str) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, "Created OpenSearch client");

        Ok(Self { client })
    }

    /// Check if the cluster is reachable and green or yellow.
    pub async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let health: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        let status = health
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        debug!(status = %status, "OpenSearch cluster health");

        Ok(status == "green" || status == "yellow")
    }

    /// Render operations as alternating action and document lines.
    fn bulk_body(operations: &[IndexOperation]) -> Vec<JsonBody<Value>> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(operations.len() * 2);

        for op in operations {
            body.push(op.header.to_json().into());
            body.push(op.body.clone().into());
        }

        body
    }
}

#[async_trait]
impl BulkTransport for OpenSearchClient {
    /// Send the batch through the `_bulk` endpoint.
    ///
    /// A transport failure, a non-success status, or `"errors": true` in the
    /// response body all become `SearchError::BulkIndexError`.
    #[instrument(skip(self, operations), fields(count = operations.len()))]
    async fn bulk(&self, operations: &[IndexOperation]) -> Result<BulkSummary, SearchError> {
        let response = self
            .client
            .bulk(BulkParts::None)
            .body(Self::bulk_body(operations))
            .send()
            .await
            .map_err(|e| SearchError::bulk_index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        parse_bulk_response(&body, operations.len())
    }

    #[instrument(skip(self))]
    async fn refresh(&self, index: &str) -> Result<RefreshSummary, SearchError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::refresh(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Refresh request failed");
            return Err(SearchError::refresh(format!(
                "Refresh of {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        parse_refresh_response(&body)
    }
}
