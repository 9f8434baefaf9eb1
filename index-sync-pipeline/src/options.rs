//! Options consumed by a synchronization run.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::bulker::Bulker;
use crate::errors::SyncError;
use crate::serializer::FieldMapping;
use index_sync_shared::Record;

/// Predicate deciding whether a record is indexed. Rejected records are reported as filtered.
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Rewrites a serialized document before it is queued. Returning `None` keeps the original.
pub type DocumentTransform = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Batching options for synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Number of records fetched from the source per round trip.
    pub batch: usize,
    /// Number of buffered operations that triggers an immediate flush.
    pub size: usize,
    /// Idle time after the last push before buffered operations are flushed.
    pub delay: Duration,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch: 50,
            size: 1000,
            delay: Duration::from_millis(1000),
        }
    }
}

impl BulkOptions {
    /// Reject values that would stall the pipeline.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.batch == 0 {
            return Err(SyncError::config("bulk batch must be greater than zero"));
        }
        if self.size == 0 {
            return Err(SyncError::config("bulk size must be greater than zero"));
        }
        Ok(())
    }
}

/// Deployment environment, used to namespace derived index names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    Development,
    Test,
}

impl Environment {
    fn index_prefix(&self) -> &'static str {
        match self {
            Environment::Production => "",
            Environment::Development => "development_",
            Environment::Test => "test_",
        }
    }
}

impl FromStr for Environment {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(SyncError::config(format!("unknown environment: {}", other))),
        }
    }
}

/// Options for one synchronizer.
#[derive(Clone)]
pub struct SyncOptions {
    /// Explicit index name. Derived from the collection name when unset.
    pub index: Option<String>,
    /// Name of the source collection.
    pub collection: String,
    /// Environment used to prefix derived index names.
    pub environment: Environment,
    /// Field mapping handed to the serializer.
    pub mapping: FieldMapping,
    /// Batching options.
    pub bulk: BulkOptions,
    /// Records rejected by the filter are skipped.
    pub filter: Option<RecordFilter>,
    /// Optional rewrite of serialized documents.
    pub transform: Option<DocumentTransform>,
    /// Time to wait after the final refresh before resolving.
    pub refresh_delay: Duration,
    /// Shared accumulator reused across runs. A fresh one is built per run when unset.
    pub bulker: Option<Bulker>,
}

impl SyncOptions {
    /// Create options for a collection with default batching.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            index: None,
            collection: collection.into(),
            environment: Environment::default(),
            mapping: FieldMapping::default(),
            bulk: BulkOptions::default(),
            filter: None,
            transform: None,
            refresh_delay: Duration::ZERO,
            bulker: None,
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_bulk(mut self, bulk: BulkOptions) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Reuse one accumulator across runs so they share flush cadence.
    pub fn with_bulker(mut self, bulker: Bulker) -> Self {
        self.bulker = Some(bulker);
        self
    }

    /// Resolve the target index name.
    ///
    /// An explicit index wins. Otherwise the lower-cased collection name is
    /// used, prefixed with `test_` or `development_` outside production.
    pub fn index_name(&self) -> Result<String, SyncError> {
        if let Some(index) = self.index.as_deref().map(str::trim) {
            if !index.is_empty() {
                return Ok(index.to_string());
            }
        }

        let collection = self.collection.trim().to_lowercase();
        if collection.is_empty() {
            return Err(SyncError::config(
                "missing collection name to build the search index name",
            ));
        }

        Ok(format!("{}{}", self.environment.index_prefix(), collection))
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("index", &self.index)
            .field("collection", &self.collection)
            .field("environment", &self.environment)
            .field("bulk", &self.bulk)
            .field("filter", &self.filter.is_some())
            .field("transform", &self.transform.is_some())
            .field("refresh_delay", &self.refresh_delay)
            .field("shared_bulker", &self.bulker.is_some())
            .finish()
    }
}
