//! Record sources for synchronization.
//!
//! A source turns a query into a `RecordCursor`: a pull-based stream of
//! records. The synchronizer pulls one record at a time and stops pulling
//! while a flush it triggered is outstanding, which is what keeps the source
//! from running ahead of the search engine.

mod memory;

pub use memory::{MemoryQuery, MemorySource};

use std::future::Future;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};

use crate::errors::SyncError;
use index_sync_shared::Record;

/// Sequential stream of source records.
pub type RecordCursor = BoxStream<'static, Result<Record, SyncError>>;

/// Equality conditions on top-level record fields. Empty matches everything.
pub type Filter = Map<String, Value>;

/// Sort direction for `FindOptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Query options passed through to the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Number of matching records to skip.
    pub skip: Option<usize>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Field to sort by.
    pub sort: Option<(String, SortDirection)>,
}

/// Field inclusion list. `_id` is always kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub fields: Vec<String>,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Keep only projected fields (and `_id`).
    pub fn apply(&self, record: Record) -> Record {
        let fields = record
            .into_fields()
            .into_iter()
            .filter(|(name, _)| name == "_id" || self.fields.iter().any(|f| f == name))
            .collect::<Map<String, Value>>();
        Record::new(fields)
    }
}

/// A collection the synchronizer can query.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Open a cursor over records matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `filter` - Equality conditions on top-level fields
    /// * `projection` - Optional field inclusion list
    /// * `options` - Skip, limit and sort
    /// * `page_size` - Number of records fetched per round trip to the store
    async fn find(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
        options: &FindOptions,
        page_size: usize,
    ) -> Result<RecordCursor, SyncError>;
}

/// A query built by the caller ahead of time.
#[async_trait]
pub trait PreparedQuery: Send {
    /// Open the query with the given page size.
    async fn open(self: Box<Self>, page_size: usize) -> Result<RecordCursor, SyncError>;
}

/// What a synchronization run reads.
pub enum SyncQuery {
    /// Build a query against the full collection.
    Find {
        filter: Filter,
        projection: Option<Projection>,
        options: FindOptions,
    },
    /// Use a query the caller already built.
    Prepared(Box<dyn PreparedQuery>),
}

impl SyncQuery {
    /// Every record in the collection.
    pub fn all() -> Self {
        Self::filter(Filter::new())
    }

    /// Records matching `filter`.
    pub fn filter(filter: Filter) -> Self {
        Self::Find {
            filter,
            projection: None,
            options: FindOptions::default(),
        }
    }

    /// Full form: filter, projection and options.
    pub fn find(filter: Filter, projection: Option<Projection>, options: FindOptions) -> Self {
        Self::Find {
            filter,
            projection,
            options,
        }
    }

    pub fn prepared(query: impl PreparedQuery + 'static) -> Self {
        Self::Prepared(Box::new(query))
    }
}

impl std::fmt::Debug for SyncQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncQuery::Find {
                filter,
                projection,
                options,
            } => f
                .debug_struct("Find")
                .field("filter", filter)
                .field("projection", projection)
                .field("options", options)
                .finish(),
            SyncQuery::Prepared(_) => f.write_str("Prepared"),
        }
    }
}

/// Build a cursor that fetches `page_size` records per call to `fetch`.
///
/// `fetch` receives the offset and page size. A short page ends the cursor;
/// an error is yielded once and ends it as well.
pub fn paged_cursor<F, Fut>(page_size: usize, fetch: F) -> RecordCursor
where
    F: FnMut(usize, usize) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<Record>, SyncError>> + Send + 'static,
{
    struct Pager<F> {
        fetch: F,
        offset: usize,
        done: bool,
    }

    let page_size = page_size.max(1);
    let pager = Pager {
        fetch,
        offset: 0,
        done: false,
    };

    stream::unfold(pager, move |mut pager| async move {
        if pager.done {
            return None;
        }

        let page: Vec<Result<Record, SyncError>> =
            match (pager.fetch)(pager.offset, page_size).await {
                Ok(records) => {
                    pager.done = records.len() < page_size;
                    pager.offset += records.len();
                    records.into_iter().map(Ok).collect()
                }
                Err(e) => {
                    pager.done = true;
                    vec![Err(e)]
                }
            };

        Some((stream::iter(page), pager))
    })
    .flatten()
    .boxed()
}

/// True if every condition in `filter` equals the record's field.
pub fn matches_filter(record: &Record, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, expected)| record.get(field) == Some(expected))
}
