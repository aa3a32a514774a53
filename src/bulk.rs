//! Background bulk delivery.
//!
//! Producers push [`BulkIndexRequest`]s into a shared pending queue. A
//! ticker drains the whole queue once per flush interval and hands the
//! drained batch to a fixed pool of workers, each of which submits the
//! batches it receives through [`DocumentStore::bulk`]. There are no
//! size-based flush triggers: only the interval and explicit flushes ship
//! documents.

use crate::delivery::DeliveryStats;
use crate::store::{BulkIndexRequest, BulkResponse, DocumentStore, StoreError};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tuning for [`BulkBatcher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkConfig {
    /// Number of concurrent bulk submitters.
    pub workers: usize,
    /// Time between automatic flushes.
    pub flush_interval: Duration,
    /// Cap on queued documents. `None` keeps the queue unbounded, which
    /// grows without limit if the store cannot keep up.
    pub max_pending: Option<usize>,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            flush_interval: Duration::from_secs(10),
            max_pending: None,
        }
    }
}

/// Errors returned by explicit flushes.
#[derive(thiserror::Error, Debug)]
pub enum BulkError {
    #[error("bulk submission failed: {0}")]
    Store(#[from] StoreError),

    #[error("bulk batcher is closed")]
    Closed,
}

type Reply = oneshot::Sender<Result<BulkResponse, StoreError>>;

struct Batch {
    requests: Vec<BulkIndexRequest>,
    reply: Option<Reply>,
}

struct QueueState {
    pending: Vec<BulkIndexRequest>,
    /// `None` once the batcher has been closed.
    batches: Option<mpsc::UnboundedSender<Batch>>,
}

struct Queue {
    state: Mutex<QueueState>,
    max_pending: Option<usize>,
    stats: Arc<DeliveryStats>,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move everything pending into one batch for the workers.
    ///
    /// With nothing pending, the reply (if any) is answered at once.
    fn dispatch(&self, reply: Option<Reply>) {
        let mut state = self.lock();
        let requests = mem::take(&mut state.pending);

        if requests.is_empty() {
            if let Some(reply) = reply {
                let _ = reply.send(Ok(BulkResponse::default()));
            }
            return;
        }

        let count = requests.len();
        let sent = match &state.batches {
            Some(batches) => batches.send(Batch { requests, reply }).is_ok(),
            None => false,
        };
        if !sent {
            DeliveryStats::add(&self.stats.dropped, count);
            warn!(count, "bulk workers are gone, dropping queued documents");
        }
    }
}

/// Owns the pending queue, the flush ticker and the worker pool.
///
/// Dropping the batcher stops the ticker; workers finish the batches
/// already handed to them and then exit. Documents still pending at that
/// point are lost, so call [`BulkBatcher::close`] first when they matter.
pub struct BulkBatcher {
    queue: Arc<Queue>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BulkBatcher {
    /// Start the ticker and `config.workers` workers on the current tokio
    /// runtime.
    ///
    /// Minimal thresholds are enforced for `workers` and `flush_interval`
    /// to avoid degenerate configurations.
    pub fn spawn(store: Arc<dyn DocumentStore>, config: &BulkConfig, stats: Arc<DeliveryStats>) -> Self {
        let workers = config.workers.max(1);
        let flush_interval = config.flush_interval.max(Duration::from_millis(10));

        let (tx, rx) = mpsc::unbounded_channel::<Batch>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let queue = Arc::new(Queue {
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                batches: Some(tx),
            }),
            max_pending: config.max_pending,
            stats: Arc::clone(&stats),
        });
        let shutdown = CancellationToken::new();

        let mut tasks = Vec::with_capacity(workers + 1);
        tasks.push(tokio::spawn(run_ticker(
            Arc::clone(&queue),
            flush_interval,
            shutdown.clone(),
        )));
        for id in 0..workers {
            tasks.push(tokio::spawn(run_worker(
                id,
                Arc::clone(&store),
                Arc::clone(&rx),
                Arc::clone(&stats),
            )));
        }

        info!(workers, ?flush_interval, "bulk batcher started");

        BulkBatcher {
            queue,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    /// Queue one request. Never blocks; the request is dropped (and
    /// counted) when the queue is at capacity or the batcher is closed.
    pub fn add(&self, request: BulkIndexRequest) {
        let mut state = self.queue.lock();
        if state.batches.is_none() {
            DeliveryStats::add(&self.queue.stats.dropped, 1);
            return;
        }
        if let Some(max) = self.queue.max_pending {
            if state.pending.len() >= max {
                drop(state);
                DeliveryStats::add(&self.queue.stats.dropped, 1);
                warn!(max_pending = max, "bulk queue full, dropping document");
                return;
            }
        }
        state.pending.push(request);
    }

    /// Number of documents waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Submit everything queued so far as one batch and wait for the
    /// outcome of that submission.
    pub async fn flush(&self) -> Result<BulkResponse, BulkError> {
        let (reply, outcome) = oneshot::channel();
        self.queue.dispatch(Some(reply));
        match outcome.await {
            Ok(result) => result.map_err(BulkError::from),
            Err(_) => Err(BulkError::Closed),
        }
    }

    /// Flush, stop the ticker and wait for the workers to drain.
    ///
    /// Safe to call more than once; later calls find nothing to do.
    pub async fn close(&self) -> Result<BulkResponse, BulkError> {
        let flushed = if self.queue.lock().batches.is_some() {
            self.flush().await
        } else {
            Ok(BulkResponse::default())
        };

        self.shutdown.cancel();
        let leftover = {
            let mut state = self.queue.lock();
            state.batches = None;
            mem::take(&mut state.pending).len()
        };
        if leftover > 0 {
            DeliveryStats::add(&self.queue.stats.dropped, leftover);
            warn!(count = leftover, "documents queued during close were dropped");
        }

        let tasks = mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "bulk task ended abnormally");
            }
        }

        info!("bulk batcher closed");
        flushed
    }
}

impl Drop for BulkBatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_ticker(queue: Arc<Queue>, period: Duration, shutdown: CancellationToken) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticks.tick() => queue.dispatch(None),
        }
    }
}

async fn run_worker(
    id: usize,
    store: Arc<dyn DocumentStore>,
    batches: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Batch>>>,
    stats: Arc<DeliveryStats>,
) {
    loop {
        let next = batches.lock().await.recv().await;
        let Some(batch) = next else { break };

        let count = batch.requests.len();
        let result = store.bulk(&batch.requests).await;
        match &result {
            Ok(resp) => {
                DeliveryStats::add(&stats.delivered, count);
                debug!(worker = id, count, took_ms = resp.took_ms, "bulk submission committed");
            }
            Err(StoreError::BulkItems { failed, first }) => {
                let failed = (*failed).min(count);
                DeliveryStats::add(&stats.failed, failed);
                DeliveryStats::add(&stats.delivered, count - failed);
                error!(worker = id, count, failed, first = %first, "bulk submission partially rejected");
            }
            Err(err) => {
                DeliveryStats::add(&stats.failed, count);
                error!(worker = id, count, error = %err, "bulk submission failed");
            }
        }

        if let Some(reply) = batch.reply {
            let _ = reply.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::memory_store::MemoryStore;
    use crate::record::LogRecord;
    use crate::severity::Severity;

    fn request(message: &str) -> BulkIndexRequest {
        let record = LogRecord::new(Severity::Info, message);
        BulkIndexRequest::new("logs", Document::encode(&record, "h1"))
    }

    fn batcher(store: &Arc<MemoryStore>, config: BulkConfig) -> (BulkBatcher, Arc<DeliveryStats>) {
        let stats = Arc::new(DeliveryStats::default());
        let store: Arc<dyn DocumentStore> = Arc::clone(store) as Arc<dyn DocumentStore>;
        (BulkBatcher::spawn(store, &config, Arc::clone(&stats)), stats)
    }

    fn messages(batch: &[BulkIndexRequest]) -> Vec<String> {
        batch.iter().map(|r| r.document.message.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ships_queued_documents_as_one_batch() {
        let store = Arc::new(MemoryStore::new());
        let (batcher, stats) = batcher(&store, BulkConfig::default());

        for i in 0..5 {
            batcher.add(request(&format!("m{i}")));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(store.bulk_batches().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;

        let batches = store.bulk_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(messages(&batches[0]), ["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(stats.snapshot().delivered, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_ticks_submit_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (_batcher, _) = batcher(&store, BulkConfig::default());
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(store.bulk_batches().is_empty());
    }

    #[tokio::test]
    async fn explicit_flush_ships_immediately() {
        let store = Arc::new(MemoryStore::new());
        let (batcher, _) = batcher(&store, BulkConfig::default());

        batcher.add(request("a"));
        batcher.add(request("b"));
        let resp = batcher.flush().await.unwrap();

        assert_eq!(resp.items, 2);
        assert_eq!(batcher.pending(), 0);
        assert_eq!(messages(&store.bulk_batches()[0]), ["a", "b"]);
    }

    #[tokio::test]
    async fn flush_with_empty_queue_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let (batcher, _) = batcher(&store, BulkConfig::default());
        assert_eq!(batcher.flush().await.unwrap(), BulkResponse::default());
        assert!(store.bulk_batches().is_empty());
    }

    #[tokio::test]
    async fn flush_reports_store_failure() {
        let store = Arc::new(MemoryStore::new().failing_bulk(500));
        let (batcher, stats) = batcher(&store, BulkConfig::default());

        batcher.add(request("a"));
        let err = batcher.flush().await.unwrap_err();
        assert!(matches!(err, BulkError::Store(StoreError::Status { status: 500, .. })));
        assert_eq!(stats.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn partially_rejected_batch_counts_accepted_items_as_delivered() {
        let store = Arc::new(MemoryStore::new().failing_bulk_items(1));
        let (batcher, stats) = batcher(&store, BulkConfig::default());

        for message in ["a", "b", "c"] {
            batcher.add(request(message));
        }
        let err = batcher.flush().await.unwrap_err();
        assert!(matches!(err, BulkError::Store(StoreError::BulkItems { failed: 1, .. })));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.delivered, 2);
    }

    #[tokio::test]
    async fn bounded_queue_drops_overflow() {
        let store = Arc::new(MemoryStore::new());
        let config = BulkConfig {
            max_pending: Some(2),
            ..BulkConfig::default()
        };
        let (batcher, stats) = batcher(&store, config);

        for name in ["a", "b", "c"] {
            batcher.add(request(name));
        }
        assert_eq!(batcher.pending(), 2);
        assert_eq!(stats.snapshot().dropped, 1);
    }

    #[tokio::test]
    async fn close_flushes_and_rejects_later_adds() {
        let store = Arc::new(MemoryStore::new());
        let (batcher, stats) = batcher(&store, BulkConfig::default());

        batcher.add(request("last words"));
        batcher.close().await.unwrap();
        assert_eq!(store.bulk_batches().len(), 1);

        batcher.add(request("too late"));
        assert_eq!(batcher.pending(), 0);
        assert_eq!(stats.snapshot().dropped, 1);
        assert!(matches!(batcher.flush().await, Ok(resp) if resp.items == 0));

        batcher.close().await.unwrap();
    }
}
