//! In-memory record source.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    matches_filter, paged_cursor, Filter, FindOptions, PreparedQuery, Projection, RecordCursor,
    RecordSource, SortDirection,
};
use crate::errors::SyncError;
use index_sync_shared::Record;

/// A collection held in memory.
///
/// Matching records are selected when the cursor is opened and then handed
/// out page by page, so page fetches are observable in tests.
#[derive(Clone, Default)]
pub struct MemorySource {
    records: Arc<RwLock<Vec<Record>>>,
    pages_fetched: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from JSON values. Non-object values are skipped.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let source = Self::new();
        for value in values {
            if let Some(record) = Record::from_value(value) {
                source.insert(record);
            }
        }
        source
    }

    pub fn insert(&self, record: Record) {
        self.records.write().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of page fetches served so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    /// Build a query to run later through `SyncQuery::Prepared`.
    pub fn prepare(
        &self,
        filter: Filter,
        projection: Option<Projection>,
        options: FindOptions,
    ) -> MemoryQuery {
        MemoryQuery {
            source: self.clone(),
            filter,
            projection,
            options,
        }
    }

    fn select(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
        options: &FindOptions,
    ) -> Vec<Record> {
        let mut selected: Vec<Record> = self
            .records
            .read()
            .iter()
            .filter(|record| matches_filter(record, filter))
            .cloned()
            .collect();

        if let Some((field, direction)) = &options.sort {
            selected.sort_by(|a, b| {
                let ordering = compare_values(a.get(field), b.get(field));
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);

        selected
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|record| match projection {
                Some(projection) => projection.apply(record),
                None => record,
            })
            .collect()
    }

    fn cursor(&self, selected: Vec<Record>, page_size: usize) -> RecordCursor {
        let selected = Arc::new(selected);
        let pages_fetched = self.pages_fetched.clone();

        paged_cursor(page_size, move |offset, size| {
            let selected = selected.clone();
            pages_fetched.fetch_add(1, Ordering::SeqCst);
            async move { Ok(selected.iter().skip(offset).take(size).cloned().collect()) }
        })
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn find(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
        options: &FindOptions,
        page_size: usize,
    ) -> Result<RecordCursor, SyncError> {
        let selected = self.select(filter, projection, options);
        Ok(self.cursor(selected, page_size))
    }
}

/// A prepared query over a `MemorySource`.
pub struct MemoryQuery {
    source: MemorySource,
    filter: Filter,
    projection: Option<Projection>,
    options: FindOptions,
}

#[async_trait]
impl PreparedQuery for MemoryQuery {
    async fn open(self: Box<Self>, page_size: usize) -> Result<RecordCursor, SyncError> {
        let selected = self
            .source
            .select(&self.filter, self.projection.as_ref(), &self.options);
        Ok(self.source.cursor(selected, page_size))
    }
}

/// Order JSON values: missing < null < bool < number < string; others compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}
