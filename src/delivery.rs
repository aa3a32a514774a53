use crate::bulk::{BulkBatcher, BulkConfig, BulkError};
use crate::document::Document;
use crate::provision::cancellable;
use crate::store::{BulkIndexRequest, BulkResponse, DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// How fired records reach the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Await every write and hand its error back to the caller.
    #[default]
    Sync,
    /// Spawn a detached write per record and return immediately.
    Async,
    /// Queue records and ship them in periodic bulk submissions.
    Bulk,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Sync => "sync",
            StrategyKind::Async => "async",
            StrategyKind::Bulk => "bulk",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown delivery strategy: {0:?}")]
pub struct ParseStrategyError(pub String);

impl FromStr for StrategyKind {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(StrategyKind::Sync),
            "async" => Ok(StrategyKind::Async),
            "bulk" => Ok(StrategyKind::Bulk),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

/// Error surfaced by a synchronous delivery.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("delivery cancelled")]
    Cancelled,
}

/// Counters shared by the hook, its detached writes and the bulk workers.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Records that passed the level gate and were handed to a strategy.
    pub fired: AtomicU64,
    /// Documents the store accepted.
    pub delivered: AtomicU64,
    /// Documents whose write or bulk submission failed.
    pub failed: AtomicU64,
    /// Documents discarded by an admission limit or a closed batcher.
    pub dropped: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub fired: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fired: self.fired.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

enum Strategy {
    Sync,
    Async { in_flight: Option<Arc<Semaphore>> },
    Bulk(BulkBatcher),
}

/// The strategy a hook was built with, together with what it needs to
/// reach the store.
pub(crate) struct Delivery {
    store: Arc<dyn DocumentStore>,
    cancel: CancellationToken,
    stats: Arc<DeliveryStats>,
    strategy: Strategy,
}

impl Delivery {
    /// Must be called from within a tokio runtime when `kind` is
    /// [`StrategyKind::Bulk`], since the batcher spawns its tasks here.
    pub(crate) fn new(
        kind: StrategyKind,
        store: Arc<dyn DocumentStore>,
        cancel: CancellationToken,
        stats: Arc<DeliveryStats>,
        max_in_flight: Option<usize>,
        bulk: &BulkConfig,
    ) -> Self {
        let strategy = match kind {
            StrategyKind::Sync => Strategy::Sync,
            StrategyKind::Async => Strategy::Async {
                in_flight: max_in_flight.map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
            },
            StrategyKind::Bulk => {
                Strategy::Bulk(BulkBatcher::spawn(Arc::clone(&store), bulk, Arc::clone(&stats)))
            }
        };

        Delivery {
            store,
            cancel,
            stats,
            strategy,
        }
    }

    pub(crate) fn kind(&self) -> StrategyKind {
        match self.strategy {
            Strategy::Sync => StrategyKind::Sync,
            Strategy::Async { .. } => StrategyKind::Async,
            Strategy::Bulk(_) => StrategyKind::Bulk,
        }
    }

    pub(crate) async fn deliver(&self, index: String, document: Document) -> Result<(), DeliveryError> {
        match &self.strategy {
            Strategy::Sync => self.write_now(&index, &document).await,
            Strategy::Async { in_flight } => {
                self.write_detached(in_flight.as_ref(), index, document);
                Ok(())
            }
            Strategy::Bulk(batcher) => {
                batcher.add(BulkIndexRequest::new(index, document));
                Ok(())
            }
        }
    }

    async fn write_now(&self, index: &str, document: &Document) -> Result<(), DeliveryError> {
        match cancellable(&self.cancel, self.store.index_document(index, document)).await {
            Some(Ok(())) => {
                DeliveryStats::add(&self.stats.delivered, 1);
                Ok(())
            }
            Some(Err(err)) => {
                DeliveryStats::add(&self.stats.failed, 1);
                Err(DeliveryError::Store(err))
            }
            None => {
                DeliveryStats::add(&self.stats.failed, 1);
                Err(DeliveryError::Cancelled)
            }
        }
    }

    fn write_detached(&self, in_flight: Option<&Arc<Semaphore>>, index: String, document: Document) {
        let permit = match in_flight.map(|limit| Arc::clone(limit).try_acquire_owned()) {
            Some(Err(_)) => {
                DeliveryStats::add(&self.stats.dropped, 1);
                warn!(%index, "too many log writes in flight, dropping document");
                return;
            }
            Some(Ok(permit)) => Some(permit),
            None => None,
        };

        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let _permit = permit;
            match store.index_document(&index, &document).await {
                Ok(()) => DeliveryStats::add(&stats.delivered, 1),
                Err(err) => {
                    DeliveryStats::add(&stats.failed, 1);
                    error!(%index, error = %err, "detached log write failed");
                }
            }
        });
    }

    /// Ship everything the bulk queue holds. Other strategies have
    /// nothing buffered.
    pub(crate) async fn flush(&self) -> Result<BulkResponse, BulkError> {
        match &self.strategy {
            Strategy::Bulk(batcher) => batcher.flush().await,
            Strategy::Sync | Strategy::Async { .. } => Ok(BulkResponse::default()),
        }
    }

    pub(crate) async fn close(&self) -> Result<BulkResponse, BulkError> {
        match &self.strategy {
            Strategy::Bulk(batcher) => batcher.close().await,
            Strategy::Sync | Strategy::Async { .. } => Ok(BulkResponse::default()),
        }
    }
}
