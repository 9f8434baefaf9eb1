//! Record source over a newline-delimited JSON export.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, instrument};

use index_sync_pipeline::source::matches_filter;
use index_sync_pipeline::{Filter, FindOptions, Projection, RecordCursor, RecordSource, SyncError};
use index_sync_shared::Record;

/// Reads records from a file holding one JSON object per line, as written by
/// collection export tools.
///
/// The file is read lazily, one page of lines at a time. Blank lines are
/// skipped; a line that is not a JSON object is a source error.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSource for JsonLinesSource {
    #[instrument(skip(self, filter, projection, options), fields(path = %self.path.display()))]
    async fn find(
        &self,
        filter: &Filter,
        projection: Option<&Projection>,
        options: &FindOptions,
        page_size: usize,
    ) -> Result<RecordCursor, SyncError> {
        if options.sort.is_some() {
            return Err(SyncError::config(
                "sorting is not supported for JSON lines exports",
            ));
        }

        let file = File::open(&self.path).await.map_err(|e| {
            SyncError::source(format!("failed to open {}: {}", self.path.display(), e))
        })?;
        debug!("Opened export");

        let filter = filter.clone();
        let projection = projection.cloned();
        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);

        let records = LinesStream::new(BufReader::new(file).lines())
            .enumerate()
            .filter_map(|(index, line)| future::ready(parse_line(index + 1, line)))
            .filter(move |item| {
                future::ready(match item {
                    Ok(record) => matches_filter(record, &filter),
                    Err(_) => true,
                })
            })
            .skip(skip)
            .take(limit)
            .map(move |item| {
                item.map(|record| match &projection {
                    Some(projection) => projection.apply(record),
                    None => record,
                })
            })
            .chunks(page_size.max(1))
            .flat_map(stream::iter)
            .boxed();

        Ok(records)
    }
}

fn parse_line(number: usize, line: io::Result<String>) -> Option<Result<Record, SyncError>> {
    let line = match line {
        Ok(line) => line,
        Err(e) => {
            return Some(Err(SyncError::source(format!(
                "failed to read line {}: {}",
                number, e
            ))))
        }
    };

    if line.trim().is_empty() {
        return None;
    }

    let parsed = match serde_json::from_str::<Value>(&line) {
        Ok(value) => Record::from_value(value)
            .ok_or_else(|| SyncError::source(format!("line {} is not a JSON object", number))),
        Err(e) => Err(SyncError::source(format!(
            "line {} is not valid JSON: {}",
            number, e
        ))),
    };

    Some(parsed)
}
