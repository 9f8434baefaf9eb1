//! Environment-driven settings for one synchronization run.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use crate::IndexingError;
use index_sync_pipeline::{BulkOptions, Environment, Filter, SyncOptions, SyncQuery};

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch_url: String,
    /// Source collection name.
    pub collection: String,
    /// Explicit index name; derived from the collection when unset.
    pub index: Option<String>,
    pub environment: Environment,
    /// Newline-delimited JSON export of the collection.
    pub source_path: PathBuf,
    /// Equality filter applied to the source.
    pub filter: Filter,
    pub bulk: BulkOptions,
    pub refresh_delay: Duration,
}

impl Settings {
    /// Read settings from process environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `SYNC_COLLECTION`: Source collection name (required)
    /// - `SYNC_INDEX`: Target index name (default: derived from the collection)
    /// - `APP_ENV`: production, development or test (default: production)
    /// - `SYNC_SOURCE_PATH`: Path of the newline-delimited JSON export (required)
    /// - `SYNC_FILTER`: JSON object of field equality conditions
    /// - `SYNC_BULK_BATCH`: Records fetched per page (default: 50)
    /// - `SYNC_BULK_SIZE`: Operations per bulk write (default: 1000)
    /// - `SYNC_BULK_DELAY_MS`: Idle time before a partial flush (default: 1000)
    /// - `SYNC_REFRESH_DELAY_MS`: Wait after the final refresh (default: 0)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexingError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let collection = get("SYNC_COLLECTION")
            .ok_or_else(|| IndexingError::config("SYNC_COLLECTION is required"))?;
        let source_path = get("SYNC_SOURCE_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| IndexingError::config("SYNC_SOURCE_PATH is required"))?;

        let environment = match get("APP_ENV") {
            Some(value) => Environment::from_str(&value)?,
            None => Environment::default(),
        };

        let filter = match get("SYNC_FILTER") {
            Some(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(filter)) => filter,
                Ok(_) => return Err(IndexingError::config("SYNC_FILTER must be a JSON object")),
                Err(e) => {
                    return Err(IndexingError::config(format!(
                        "SYNC_FILTER is not valid JSON: {}",
                        e
                    )))
                }
            },
            None => Filter::new(),
        };

        let defaults = BulkOptions::default();
        let bulk = BulkOptions {
            batch: parse_number(get("SYNC_BULK_BATCH"), "SYNC_BULK_BATCH")?
                .unwrap_or(defaults.batch),
            size: parse_number(get("SYNC_BULK_SIZE"), "SYNC_BULK_SIZE")?
                .unwrap_or(defaults.size),
            delay: parse_number(get("SYNC_BULK_DELAY_MS"), "SYNC_BULK_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        };
        let refresh_delay = parse_number(get("SYNC_REFRESH_DELAY_MS"), "SYNC_REFRESH_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);

        Ok(Self {
            opensearch_url: get("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            collection,
            index: get("SYNC_INDEX"),
            environment,
            source_path,
            filter,
            bulk,
            refresh_delay,
        })
    }

    /// Options for the synchronizer.
    pub fn sync_options(&self) -> SyncOptions {
        let options = SyncOptions::new(self.collection.clone())
            .with_environment(self.environment)
            .with_bulk(self.bulk)
            .with_refresh_delay(self.refresh_delay);

        match &self.index {
            Some(index) => options.with_index(index.clone()),
            None => options,
        }
    }

    /// Query for the configured filter.
    pub fn query(&self) -> SyncQuery {
        SyncQuery::filter(self.filter.clone())
    }
}

fn parse_number<T: FromStr>(value: Option<String>, key: &str) -> Result<Option<T>, IndexingError> {
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| IndexingError::config(format!("{} must be a number, got {:?}", key, raw)))
        })
        .transpose()
}
