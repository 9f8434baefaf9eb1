//! Batch accumulator for bulk index operations.
//!
//! A `Bulker` buffers operations and flushes them to the search engine as one
//! bulk write when either trigger fires:
//!
//! 1. **Size**: a push brings the buffer to `size` operations
//! 2. **Idle time**: `delay` elapses after the most recent push
//!
//! A flush removes the buffered operations immediately and hands the snapshot
//! to a sender task. Snapshots are sent strictly one at a time in flush order;
//! outcomes are delivered to subscribers as `BulkEvent`s.

mod events;

pub use events::{BulkEvent, BulkSubscription};

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::options::BulkOptions;
use index_sync_repository::BulkTransport;
use index_sync_shared::IndexOperation;

/// Buffers index operations and flushes them under size and idle-time triggers.
///
/// `Bulker` is a cheap handle; clones share the same buffer, so one instance
/// can be handed to several synchronization runs as long as they do not run
/// concurrently.
///
/// `push` and `flush` spawn Tokio tasks and must be called from within a
/// Tokio runtime.
#[derive(Clone)]
pub struct Bulker {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn BulkTransport>,
    capacity: usize,
    idle_window: Duration,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    buffer: Vec<IndexOperation>,
    idle_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the idle timer is re-armed or cancelled. A timer that
    /// wakes up with a stale generation does nothing.
    timer_generation: u64,
    queue: VecDeque<PendingBatch>,
    sender_active: bool,
    /// Snapshots queued or in flight.
    outstanding: usize,
    last_batch: u64,
    listeners: Vec<(u64, mpsc::UnboundedSender<BulkEvent>)>,
    next_listener: u64,
}

struct PendingBatch {
    id: u64,
    operations: Vec<IndexOperation>,
}

impl Bulker {
    /// Create a new accumulator writing through the given transport.
    pub fn new(transport: Arc<dyn BulkTransport>, options: &BulkOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                capacity: options.size.max(1),
                idle_window: options.delay,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Append operations in order.
    ///
    /// Returns `true` if the push brought the buffer to capacity and triggered
    /// an immediate flush. Every full `capacity`-sized prefix of the buffer is
    /// flushed as its own batch; any remainder stays buffered under a fresh
    /// idle timer. Pushing nothing is a no-op.
    pub fn push(&self, operations: Vec<IndexOperation>) -> bool {
        if operations.is_empty() {
            return false;
        }

        let capacity = self.inner.capacity;
        let mut state = self.inner.state.lock();
        state.buffer.extend(operations);

        let mut sending = false;
        while state.buffer.len() >= capacity {
            let batch: Vec<IndexOperation> = state.buffer.drain(..capacity).collect();
            self.inner.dispatch_locked(&mut state, batch);
            sending = true;
        }

        if state.buffer.is_empty() {
            Inner::cancel_idle_timer(&mut state);
        } else {
            self.inner.arm_idle_timer(&mut state);
        }

        sending
    }

    /// Send everything buffered as one bulk write.
    ///
    /// The buffer is empty when this returns; the write itself completes
    /// asynchronously. No-op when nothing is buffered.
    pub fn flush(&self) {
        let mut state = self.inner.state.lock();
        self.inner.flush_locked(&mut state);
    }

    /// True if operations are waiting in the buffer.
    pub fn filled(&self) -> bool {
        !self.inner.state.lock().buffer.is_empty()
    }

    /// True while a flushed snapshot has no known outcome yet.
    pub fn is_flushing(&self) -> bool {
        self.inner.state.lock().outstanding > 0
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer length that triggers an immediate flush.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn idle_window(&self) -> Duration {
        self.inner.idle_window
    }

    /// Number of the most recently flushed batch, or 0 if none.
    pub fn last_batch(&self) -> u64 {
        self.inner.state.lock().last_batch
    }

    /// Attach a listener. It receives the outcome of every batch whose send
    /// completes while the subscription is alive.
    pub fn subscribe(&self) -> BulkSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut state = self.inner.state.lock();
        state.next_listener += 1;
        let id = state.next_listener;
        state.listeners.push((id, sender));

        BulkSubscription::new(id, receiver, Arc::downgrade(&self.inner))
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }
}

impl Inner {
    fn arm_idle_timer(self: &Arc<Self>, state: &mut State) {
        Self::cancel_idle_timer(state);

        let generation = state.timer_generation;
        let inner = Arc::clone(self);
        let window = self.idle_window;

        state.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let mut state = inner.state.lock();
            if state.timer_generation != generation {
                return;
            }
            state.idle_timer = None;
            debug!(
                idle_ms = window.as_millis() as u64,
                count = state.buffer.len(),
                "Idle window elapsed"
            );
            inner.flush_locked(&mut state);
        }));
    }

    fn cancel_idle_timer(state: &mut State) {
        state.timer_generation += 1;
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
    }

    fn flush_locked(self: &Arc<Self>, state: &mut State) {
        Self::cancel_idle_timer(state);

        if state.buffer.is_empty() {
            return;
        }

        let operations = std::mem::take(&mut state.buffer);
        self.dispatch_locked(state, operations);
    }

    /// Queue a snapshot for sending and make sure a sender task is running.
    fn dispatch_locked(self: &Arc<Self>, state: &mut State, operations: Vec<IndexOperation>) {
        state.last_batch += 1;
        state.outstanding += 1;

        let id = state.last_batch;
        debug!(batch = id, count = operations.len(), "Flushing operations");
        state.queue.push_back(PendingBatch { id, operations });

        if !state.sender_active {
            state.sender_active = true;
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.send_queued().await });
        }
    }

    /// Send queued snapshots one at a time until the queue is empty.
    async fn send_queued(self: Arc<Self>) {
        loop {
            let batch = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(batch) => batch,
                    None => {
                        state.sender_active = false;
                        return;
                    }
                }
            };

            let count = batch.operations.len();
            let event = match self.transport.bulk(&batch.operations).await {
                Ok(summary) => {
                    debug!(
                        batch = batch.id,
                        count = count,
                        took_ms = summary.took_ms,
                        "Bulk sent"
                    );
                    BulkEvent::Sent {
                        batch: batch.id,
                        count,
                    }
                }
                Err(e) => {
                    debug!(batch = batch.id, count = count, error = %e, "Bulk write failed");
                    BulkEvent::Error {
                        batch: batch.id,
                        count,
                        error: e,
                    }
                }
            };

            // Settle and fan out under one lock so `is_flushing() == false`
            // implies every outcome is already in the subscribers' queues.
            {
                let mut state = self.state.lock();
                state.outstanding -= 1;
                state
                    .listeners
                    .retain(|(_, listener)| listener.send(event.clone()).is_ok());
            }
        }
    }

    fn detach(&self, id: u64) {
        self.state.lock().listeners.retain(|(listener, _)| *listener != id);
    }
}

impl fmt::Debug for Bulker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Bulker")
            .field("capacity", &self.inner.capacity)
            .field("idle_window", &self.inner.idle_window)
            .field("buffered", &state.buffer.len())
            .field("outstanding", &state.outstanding)
            .field("last_batch", &state.last_batch)
            .finish()
    }
}
