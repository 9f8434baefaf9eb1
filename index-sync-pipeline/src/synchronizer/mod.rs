//! Synchronization engine.
//!
//! Streams records out of a `RecordSource`, turns them into index operations
//! and feeds them to a `Bulker`. When a push fills the buffer, the engine stops
//! pulling from the cursor until that batch's outcome is known. Once the cursor
//! is exhausted, the remainder is flushed, every outstanding batch is awaited
//! and the target index is refreshed exactly once.

mod events;

pub use events::{SyncEvent, SyncListener, TracingListener};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bulker::{BulkEvent, BulkSubscription, Bulker};
use crate::errors::SyncError;
use crate::options::SyncOptions;
use crate::serializer::{MappingSerializer, Serializer};
use crate::source::{RecordCursor, RecordSource, SyncQuery};
use index_sync_repository::BulkTransport;
use index_sync_shared::{IndexOperation, Record, RefreshSummary};

/// Result of a completed synchronization run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Index that was written and refreshed.
    pub index: String,
    /// Shard counts reported by the final refresh.
    pub refresh: RefreshSummary,
    /// Records queued for indexing.
    pub queued: usize,
    /// Records rejected by the filter.
    pub filtered: usize,
    /// Records with nothing to index (no usable id, or the serializer returned nothing).
    pub dropped: usize,
    /// Operations confirmed by the search engine.
    pub sent: usize,
    /// Bulk writes that failed.
    pub failed_batches: usize,
    /// Operations in failed bulk writes.
    pub failed_operations: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Copies a collection into a search index.
///
/// A synchronizer may be used for several runs, one after another.
pub struct Synchronizer {
    transport: Arc<dyn BulkTransport>,
    source: Arc<dyn RecordSource>,
    serializer: Arc<dyn Serializer>,
    listener: Arc<dyn SyncListener>,
    options: SyncOptions,
    index: String,
}

impl Synchronizer {
    /// Create a synchronizer.
    ///
    /// Fails with a configuration error when no index name can be resolved or
    /// the bulk options are unusable.
    pub fn new(
        transport: Arc<dyn BulkTransport>,
        source: Arc<dyn RecordSource>,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        options.bulk.validate()?;
        let index = options.index_name()?;

        Ok(Self {
            transport,
            source,
            serializer: Arc::new(MappingSerializer),
            listener: Arc::new(TracingListener),
            options,
            index,
        })
    }

    /// Replace the default tracing listener.
    pub fn with_listener(mut self, listener: impl SyncListener + 'static) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    /// Replace the default mapping serializer.
    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Resolved target index.
    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one synchronization.
    ///
    /// Bulk write failures are reported to the listener and do not stop the
    /// run. The returned future resolves after the final refresh, and fails if
    /// the source fails or the refresh is rejected.
    #[instrument(skip(self, query), fields(index = %self.index, run_id = %Uuid::new_v4()))]
    pub async fn synchronize(&self, query: SyncQuery) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!("Started synchronizing");

        let mut cursor = self.open(query).await?;

        let bulker = match &self.options.bulker {
            Some(shared) => shared.clone(),
            None => Bulker::new(self.transport.clone(), &self.options.bulk),
        };
        let mut run = Run::new(bulker.subscribe(), self.listener.as_ref());

        let mut source_error = None;
        while let Some(item) = cursor.next().await {
            run.deliver_pending();

            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    error!(error = %e, "Record source failed");
                    source_error = Some(e);
                    break;
                }
            };

            if !self.accepts(&record) {
                run.filtered(record);
                continue;
            }

            let Some(operation) = self.operation_for(&record) else {
                run.stats.dropped += 1;
                continue;
            };

            let sending = bulker.push(vec![operation]);
            run.queued(record);

            if sending {
                run.wait_for_batch(bulker.last_batch()).await;
            }
        }
        drop(cursor);

        if bulker.filled() {
            bulker.flush();
        }
        run.drain(&bulker).await;
        let stats = run.finish();

        if let Some(e) = source_error {
            return Err(e);
        }

        let refresh = match self.transport.refresh(&self.index).await {
            Ok(refresh) => refresh,
            Err(e) => {
                error!(error = %e, "Final refresh failed");
                return Err(e.into());
            }
        };
        if !self.options.refresh_delay.is_zero() {
            sleep(self.options.refresh_delay).await;
        }
        let elapsed = clock.elapsed();

        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            queued = stats.queued,
            sent = stats.sent,
            failed_batches = stats.failed_batches,
            "Finished synchronizing"
        );

        Ok(SyncReport {
            index: self.index.clone(),
            refresh,
            queued: stats.queued,
            filtered: stats.filtered,
            dropped: stats.dropped,
            sent: stats.sent,
            failed_batches: stats.failed_batches,
            failed_operations: stats.failed_operations,
            started_at,
            elapsed,
        })
    }

    async fn open(&self, query: SyncQuery) -> Result<RecordCursor, SyncError> {
        let page_size = self.options.bulk.batch;
        match query {
            SyncQuery::Find {
                filter,
                projection,
                options,
            } => {
                self.source
                    .find(&filter, projection.as_ref(), &options, page_size)
                    .await
            }
            SyncQuery::Prepared(prepared) => prepared.open(page_size).await,
        }
    }

    fn accepts(&self, record: &Record) -> bool {
        match &self.options.filter {
            Some(filter) => filter(record),
            None => true,
        }
    }

    fn operation_for(&self, record: &Record) -> Option<IndexOperation> {
        let Some(id) = record.id() else {
            warn!("Record without a usable _id, skipping");
            return None;
        };

        let Some(mut body) = self.serializer.serialize(record, &self.options.mapping) else {
            debug!(id = %id, "Nothing to index for record");
            return None;
        };

        if let Some(transform) = &self.options.transform {
            if let Some(transformed) = transform(&body) {
                body = transformed;
            }
        }

        Some(IndexOperation::index(self.index.clone(), id, body))
    }
}

/// Counters gathered during one run.
#[derive(Debug, Default)]
struct RunStats {
    queued: usize,
    filtered: usize,
    dropped: usize,
    sent: usize,
    failed_batches: usize,
    failed_operations: usize,
}

/// Per-run state: the bulker subscription plus counters.
///
/// The subscription is dropped in `finish`, which detaches the run's listener
/// from a shared bulker.
struct Run<'a> {
    subscription: BulkSubscription,
    listener: &'a dyn SyncListener,
    /// Highest batch number with a known outcome.
    settled: u64,
    stats: RunStats,
}

impl<'a> Run<'a> {
    fn new(subscription: BulkSubscription, listener: &'a dyn SyncListener) -> Self {
        Self {
            subscription,
            listener,
            settled: 0,
            stats: RunStats::default(),
        }
    }

    fn filtered(&mut self, record: Record) {
        self.stats.filtered += 1;
        self.listener.on_event(&SyncEvent::BulkFiltered(record));
    }

    fn queued(&mut self, record: Record) {
        self.stats.queued += 1;
        self.listener.on_event(&SyncEvent::BulkData(record));
    }

    fn observe(&mut self, event: BulkEvent) {
        self.settled = self.settled.max(event.batch());

        match event {
            BulkEvent::Sent { batch, count } => {
                self.stats.sent += count;
                self.listener.on_event(&SyncEvent::BulkSent { batch, count });
            }
            BulkEvent::Error {
                batch,
                count,
                error,
            } => {
                self.stats.failed_batches += 1;
                self.stats.failed_operations += count;
                self.listener.on_event(&SyncEvent::BulkError { batch, error });
            }
        }
    }

    /// Report outcomes that already arrived, without waiting.
    fn deliver_pending(&mut self) {
        while let Some(event) = self.subscription.try_recv() {
            self.observe(event);
        }
    }

    /// Wait until `batch` and every batch before it has an outcome.
    async fn wait_for_batch(&mut self, batch: u64) {
        while self.settled < batch {
            match self.subscription.recv().await {
                Some(event) => self.observe(event),
                None => break,
            }
        }
    }

    /// Wait until the bulker has nothing in flight.
    async fn drain(&mut self, bulker: &Bulker) {
        while bulker.is_flushing() {
            match self.subscription.recv().await {
                Some(event) => self.observe(event),
                None => break,
            }
        }
        self.deliver_pending();
    }

    fn finish(self) -> RunStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BulkOptions;
    use crate::serializer::FieldMapping;
    use crate::source::{Filter, FindOptions, MemorySource, PreparedQuery};
    use async_trait::async_trait;
    use futures::stream;
    use index_sync_repository::SearchError;
    use index_sync_shared::BulkSummary;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Mock search engine recording bulk batches and refreshes.
    #[derive(Default)]
    struct MockTransport {
        batches: Mutex<Vec<Vec<IndexOperation>>>,
        refreshes: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail_calls: Vec<usize>,
        fail_refresh: bool,
        gate: Option<Semaphore>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self::default()
        }

        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::default()
            }
        }

        fn release(&self, permits: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(permits);
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().iter().map(Vec::len).collect()
        }

        fn sent_ids(&self) -> Vec<String> {
            self.batches
                .lock()
                .iter()
                .flatten()
                .map(|op| op.header.id.clone())
                .collect()
        }

        fn refresh_count(&self) -> usize {
            self.refreshes.lock().len()
        }
    }

    #[async_trait]
    impl BulkTransport for MockTransport {
        async fn bulk(&self, operations: &[IndexOperation]) -> Result<BulkSummary, SearchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }

            if self.fail_calls.contains(&call) {
                return Err(SearchError::bulk_index("Mock failure"));
            }

            self.batches.lock().push(operations.to_vec());
            Ok(BulkSummary {
                total: operations.len(),
                took_ms: 1,
            })
        }

        async fn refresh(&self, index: &str) -> Result<RefreshSummary, SearchError> {
            self.refreshes.lock().push(index.to_string());
            if self.fail_refresh {
                return Err(SearchError::refresh("Mock refresh failure"));
            }
            Ok(RefreshSummary {
                total: 1,
                successful: 1,
                failed: 0,
            })
        }
    }

    /// Listener collecting every event.
    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<SyncEvent>>>,
    }

    impl Recorder {
        fn count(&self, predicate: impl Fn(&SyncEvent) -> bool) -> usize {
            self.events.lock().iter().filter(|e| predicate(e)).count()
        }
    }

    impl SyncListener for Recorder {
        fn on_event(&self, event: &SyncEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn cats(count: usize) -> MemorySource {
        MemorySource::from_values(
            (0..count).map(|i| json!({ "_id": i.to_string(), "name": format!("cat {}", i), "n": i })),
        )
    }

    fn options(size: usize) -> SyncOptions {
        SyncOptions::new("cats").with_bulk(BulkOptions {
            batch: 10,
            size,
            delay: Duration::from_millis(100),
        })
    }

    fn synchronizer(
        transport: &Arc<MockTransport>,
        source: MemorySource,
        options: SyncOptions,
    ) -> Synchronizer {
        Synchronizer::new(transport.clone(), Arc::new(source), options).unwrap()
    }

    /// A prepared query over a fixed list of records that counts pulls.
    struct CountingQuery {
        records: Vec<Record>,
        pulled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PreparedQuery for CountingQuery {
        async fn open(self: Box<Self>, _page_size: usize) -> Result<RecordCursor, SyncError> {
            let pulled = self.pulled.clone();
            Ok(stream::iter(self.records)
                .inspect(move |_| {
                    pulled.fetch_add(1, Ordering::SeqCst);
                })
                .map(Ok)
                .boxed())
        }
    }

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| Record::from_value(json!({ "_id": i.to_string(), "n": i })).unwrap())
            .collect()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_empty_source_still_refreshes() {
        let transport = Arc::new(MockTransport::new());
        let sync = synchronizer(&transport, MemorySource::new(), options(10));

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(report.queued, 0);
        assert_eq!(report.refresh.successful, 1);
        assert!(transport.batch_sizes().is_empty());
        assert_eq!(transport.refreshes.lock().clone(), vec!["cats".to_string()]);
    }

    #[tokio::test]
    async fn test_all_records_filtered() {
        let transport = Arc::new(MockTransport::new());
        let recorder = Recorder::default();
        let sync = synchronizer(
            &transport,
            cats(5),
            options(10).with_filter(|_record: &Record| false),
        )
        .with_listener(recorder.clone());

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(report.filtered, 5);
        assert_eq!(report.queued, 0);
        assert!(transport.batch_sizes().is_empty());
        assert_eq!(transport.refresh_count(), 1);
        assert_eq!(
            recorder.count(|e| matches!(e, SyncEvent::BulkFiltered(_))),
            5
        );
    }

    #[tokio::test]
    async fn test_records_are_sent_in_size_batches() {
        let transport = Arc::new(MockTransport::new());
        let recorder = Recorder::default();
        let sync = synchronizer(&transport, cats(25), options(10)).with_listener(recorder.clone());

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(transport.batch_sizes(), vec![10, 10, 5]);
        assert_eq!(report.queued, 25);
        assert_eq!(report.sent, 25);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(transport.refresh_count(), 1);

        let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(transport.sent_ids(), expected);
        assert_eq!(recorder.count(|e| matches!(e, SyncEvent::BulkData(_))), 25);
        assert_eq!(
            recorder.count(|e| matches!(e, SyncEvent::BulkSent { .. })),
            3
        );
    }

    #[tokio::test]
    async fn test_bulk_failure_does_not_stop_the_run() {
        let transport = Arc::new(MockTransport {
            fail_calls: vec![0],
            ..MockTransport::default()
        });
        let recorder = Recorder::default();
        let sync = synchronizer(&transport, cats(12), options(5)).with_listener(recorder.clone());

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.failed_operations, 5);
        assert_eq!(report.sent, 7);
        assert_eq!(transport.batch_sizes(), vec![5, 2]);
        assert_eq!(transport.refresh_count(), 1);
        assert_eq!(
            recorder.count(|e| matches!(e, SyncEvent::BulkError { batch: 1, .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_rejects_the_run() {
        let transport = Arc::new(MockTransport {
            fail_refresh: true,
            ..MockTransport::default()
        });
        let sync = synchronizer(&transport, cats(3), options(10));

        let result = sync.synchronize(SyncQuery::all()).await;

        assert!(matches!(
            result,
            Err(SyncError::SearchError(SearchError::RefreshError(_)))
        ));
        assert_eq!(transport.batch_sizes(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_skips_refresh_delay() {
        let transport = Arc::new(MockTransport {
            fail_refresh: true,
            ..MockTransport::default()
        });
        let sync = synchronizer(
            &transport,
            cats(1),
            options(10).with_refresh_delay(Duration::from_secs(60)),
        );
        let start = Instant::now();

        let result = sync.synchronize(SyncQuery::all()).await;

        assert!(matches!(
            result,
            Err(SyncError::SearchError(SearchError::RefreshError(_)))
        ));
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(transport.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_source_error_skips_refresh() {
        struct BrokenQuery;

        #[async_trait]
        impl PreparedQuery for BrokenQuery {
            async fn open(self: Box<Self>, _page_size: usize) -> Result<RecordCursor, SyncError> {
                let items = vec![
                    Ok(Record::from_value(json!({ "_id": "1" })).unwrap()),
                    Err(SyncError::source("cursor died")),
                ];
                Ok(stream::iter(items).boxed())
            }
        }

        let transport = Arc::new(MockTransport::new());
        let bulker = Bulker::new(transport.clone(), &BulkOptions::default());
        let sync = synchronizer(
            &transport,
            MemorySource::new(),
            options(10).with_bulker(bulker.clone()),
        );

        let result = sync.synchronize(SyncQuery::prepared(BrokenQuery)).await;

        assert!(matches!(result, Err(SyncError::SourceError(_))));
        assert_eq!(transport.refresh_count(), 0);
        // What was read before the failure is still flushed.
        assert_eq!(transport.batch_sizes(), vec![1]);
        assert_eq!(bulker.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_pulling_pauses_while_batch_is_in_flight() {
        let transport = Arc::new(MockTransport::gated());
        let pulled = Arc::new(AtomicUsize::new(0));
        let sync = synchronizer(&transport, MemorySource::new(), options(2));

        let query = CountingQuery {
            records: records(6),
            pulled: pulled.clone(),
        };
        let run = tokio::spawn(async move { sync.synchronize(SyncQuery::prepared(query)).await });

        settle().await;
        assert_eq!(pulled.load(Ordering::SeqCst), 2);

        transport.release(1);
        settle().await;
        assert_eq!(pulled.load(Ordering::SeqCst), 4);

        transport.release(2);
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.sent, 6);
        assert_eq!(transport.batch_sizes(), vec![2, 2, 2]);
    }

    #[tokio::test]
    async fn test_finalizes_only_after_in_flight_flush() {
        let transport = Arc::new(MockTransport::gated());
        let done = Arc::new(AtomicBool::new(false));
        let sync = synchronizer(&transport, cats(3), options(2));

        let run = {
            let done = done.clone();
            tokio::spawn(async move {
                let report = sync.synchronize(SyncQuery::all()).await;
                done.store(true, Ordering::SeqCst);
                report
            })
        };

        settle().await;
        transport.release(1);
        settle().await;

        // The last record was flushed when the cursor ended; its send is held.
        assert_eq!(transport.batch_sizes(), vec![2]);
        assert_eq!(transport.refresh_count(), 0);
        assert!(!done.load(Ordering::SeqCst));

        transport.release(1);
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.sent, 3);
        assert_eq!(transport.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_shared_bulker_across_runs() {
        let transport = Arc::new(MockTransport::new());
        let bulker = Bulker::new(transport.clone(), &BulkOptions::default());
        let source = cats(4);
        let sync = Synchronizer::new(
            transport.clone(),
            Arc::new(source),
            options(10).with_bulker(bulker.clone()),
        )
        .unwrap();

        let first = sync.synchronize(SyncQuery::all()).await.unwrap();
        assert_eq!(bulker.listener_count(), 0);

        let second = sync.synchronize(SyncQuery::all()).await.unwrap();
        assert_eq!(bulker.listener_count(), 0);

        assert_eq!(first.sent, 4);
        assert_eq!(second.sent, 4);
        assert_eq!(transport.refresh_count(), 2);
        assert!(!bulker.filled());
    }

    #[tokio::test]
    async fn test_prepared_query_with_transform() {
        let transport = Arc::new(MockTransport::new());
        let source = cats(6);
        let mut filter = Filter::new();
        filter.insert("n".to_string(), json!(2));
        let query = source.prepare(filter, None, FindOptions::default());

        let sync = synchronizer(
            &transport,
            source.clone(),
            options(10)
                .with_mapping(FieldMapping::from_fields(["name"]))
                .with_transform(|body: &Value| {
                    let mut body = body.clone();
                    body["indexed"] = json!(true);
                    Some(body)
                }),
        );

        let report = sync.synchronize(SyncQuery::prepared(query)).await.unwrap();

        assert_eq!(report.sent, 1);
        let batches = transport.batches.lock();
        assert_eq!(batches[0][0].header.id, "2");
        assert_eq!(
            batches[0][0].body,
            json!({ "name": "cat 2", "indexed": true })
        );
    }

    #[tokio::test]
    async fn test_record_without_id_is_dropped_and_unmapped_record_is_emptied() {
        let transport = Arc::new(MockTransport::new());
        let source = MemorySource::from_values(vec![
            json!({ "name": "no id" }),
            json!({ "_id": "1", "secret": "x" }),
            json!({ "_id": "2", "name": "Tom" }),
        ]);
        let sync = synchronizer(
            &transport,
            source,
            options(10).with_mapping(FieldMapping::from_fields(["name"])),
        );

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(report.dropped, 1);
        assert_eq!(report.queued, 2);
        assert_eq!(
            transport.sent_ids(),
            vec!["1".to_string(), "2".to_string()]
        );
        let batches = transport.batches.lock();
        assert_eq!(batches[0][0].body, json!({}));
        assert_eq!(batches[0][1].body, json!({ "name": "Tom" }));
    }

    #[tokio::test]
    async fn test_serializer_returning_nothing_drops_record() {
        struct Nothing;

        impl Serializer for Nothing {
            fn serialize(&self, _record: &Record, _mapping: &FieldMapping) -> Option<Value> {
                None
            }
        }

        let transport = Arc::new(MockTransport::new());
        let sync = synchronizer(&transport, cats(3), options(10)).with_serializer(Nothing);

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(report.dropped, 3);
        assert_eq!(report.queued, 0);
        assert!(transport.batch_sizes().is_empty());
        assert_eq!(transport.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_cursor_is_opened_with_batch_page_size() {
        let transport = Arc::new(MockTransport::new());
        let source = cats(25);
        let sync = synchronizer(&transport, source.clone(), options(100));

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(report.queued, 25);
        // Pages of 10, 10 and a short page of 5.
        assert_eq!(source.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn test_prepared_query_receives_batch_page_size() {
        struct PageSizeQuery {
            seen: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl PreparedQuery for PageSizeQuery {
            async fn open(self: Box<Self>, page_size: usize) -> Result<RecordCursor, SyncError> {
                self.seen.store(page_size, Ordering::SeqCst);
                Ok(stream::iter(records(1)).map(Ok).boxed())
            }
        }

        let transport = Arc::new(MockTransport::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let sync = synchronizer(&transport, MemorySource::new(), options(100));

        sync.synchronize(SyncQuery::prepared(PageSizeQuery { seen: seen.clone() }))
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_flush_while_source_is_slow() {
        let transport = Arc::new(MockTransport::new());
        let sync = synchronizer(&transport, MemorySource::new(), options(10));

        struct SlowQuery;

        #[async_trait]
        impl PreparedQuery for SlowQuery {
            async fn open(self: Box<Self>, _page_size: usize) -> Result<RecordCursor, SyncError> {
                Ok(stream::iter(records(2))
                    .then(|record| async move {
                        sleep(Duration::from_millis(500)).await;
                        Ok(record)
                    })
                    .boxed())
            }
        }

        let report = sync.synchronize(SyncQuery::prepared(SlowQuery)).await.unwrap();

        assert_eq!(transport.batch_sizes(), vec![1, 1]);
        assert_eq!(report.sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_delay_is_waited() {
        let transport = Arc::new(MockTransport::new());
        let sync = synchronizer(
            &transport,
            cats(1),
            options(10).with_refresh_delay(Duration::from_millis(500)),
        );

        let report = sync.synchronize(SyncQuery::all()).await.unwrap();

        assert!(report.elapsed >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_config_errors_surface_at_construction() {
        let transport = Arc::new(MockTransport::new());
        let source = cats(1);

        let missing_collection = Synchronizer::new(
            transport.clone(),
            Arc::new(source.clone()),
            SyncOptions::new(""),
        );
        assert!(matches!(missing_collection, Err(SyncError::ConfigError(_))));

        let zero_size = Synchronizer::new(
            transport.clone(),
            Arc::new(source.clone()),
            options(0),
        );
        assert!(matches!(zero_size, Err(SyncError::ConfigError(_))));
        assert_eq!(source.pages_fetched(), 0);
    }

    /// Layer recording the level and message of every event.
    #[derive(Clone, Default)]
    struct LogRecorder {
        events: Arc<Mutex<Vec<(tracing::Level, String)>>>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LogRecorder {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Message(String);

            impl tracing::field::Visit for Message {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.0 = format!("{:?}", value);
                    }
                }
            }

            let mut message = Message(String::new());
            event.record(&mut message);
            self.events
                .lock()
                .push((*event.metadata().level(), message.0));
        }
    }

    #[tokio::test]
    async fn test_batch_outcomes_logged_once_at_info() {
        use tracing_subscriber::layer::SubscriberExt;

        let recorder = LogRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let transport = Arc::new(MockTransport {
            fail_calls: vec![0],
            ..MockTransport::default()
        });
        let sync = synchronizer(&transport, cats(12), options(5));

        sync.synchronize(SyncQuery::all()).await.unwrap();

        let visible = |message: &str| {
            recorder
                .events
                .lock()
                .iter()
                .filter(|(level, m)| *level <= tracing::Level::INFO && m == message)
                .count()
        };
        assert_eq!(visible("Bulk sent"), 2);
        assert_eq!(visible("Bulk write failed"), 1);
    }

    #[tokio::test]
    async fn test_closure_listener() {
        let transport = Arc::new(MockTransport::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sync = synchronizer(&transport, cats(3), options(10)).with_listener(
            move |event: &SyncEvent| {
                if matches!(event, SyncEvent::BulkData(_)) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        sync.synchronize(SyncQuery::all()).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
