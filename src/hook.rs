use crate::bulk::{BulkConfig, BulkError};
use crate::delivery::{Delivery, DeliveryError, DeliveryStats, StatsSnapshot, StrategyKind};
use crate::document::Document;
use crate::index::IndexNameResolver;
use crate::provision::{provision, ProvisionError};
use crate::record::LogRecord;
use crate::severity::{levels_at_or_above, Severity};
use crate::store::{BulkResponse, DocumentStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Settings a [`LogHook`] is built from.
#[derive(Clone, Debug)]
pub struct HookConfig {
    /// Host identifier stamped on every document.
    pub host: String,
    /// Least severe level the hook reacts to.
    pub min_level: Severity,
    pub strategy: StrategyKind,
    /// Cap on concurrent detached writes for [`StrategyKind::Async`].
    /// `None` spawns one task per record without limit.
    pub max_in_flight: Option<usize>,
    /// Only used by [`StrategyKind::Bulk`].
    pub bulk: BulkConfig,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            min_level: Severity::Info,
            strategy: StrategyKind::Sync,
            max_in_flight: None,
            bulk: BulkConfig::default(),
        }
    }
}

impl HookConfig {
    pub fn new(host: impl Into<String>, min_level: Severity, strategy: StrategyKind) -> Self {
        Self {
            host: host.into(),
            min_level,
            strategy,
            ..Self::default()
        }
    }
}

/// Hostname of this machine, or `localhost` when it cannot be read.
pub fn default_host() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Ships log records to a document store.
///
/// A hook is either active or cancelled. Cancellation is one-way: it
/// aborts synchronous writes still waiting on the store and makes later
/// synchronous writes fail, but leaves detached writes and the bulk queue
/// alone.
pub struct LogHook {
    host: String,
    index: Box<dyn IndexNameResolver>,
    levels: Vec<Severity>,
    cancel: CancellationToken,
    stats: Arc<DeliveryStats>,
    delivery: Delivery,
}

impl LogHook {
    /// Provision the index and build a hook around `store`.
    ///
    /// **Errors**
    /// - [`ProvisionError`] when the index could not be confirmed or
    ///   created; no hook is produced and nothing is delivered.
    pub async fn new<R>(store: Arc<dyn DocumentStore>, config: HookConfig, index: R) -> Result<Self, ProvisionError>
    where
        R: IndexNameResolver + 'static,
    {
        Self::with_cancellation(store, config, index, &CancellationToken::new()).await
    }

    /// Like [`LogHook::new`], but the hook's cancellation token is a child
    /// of `parent`, so cancelling `parent` cancels the hook (and any
    /// provisioning still in progress).
    pub async fn with_cancellation<R>(
        store: Arc<dyn DocumentStore>,
        config: HookConfig,
        index: R,
        parent: &CancellationToken,
    ) -> Result<Self, ProvisionError>
    where
        R: IndexNameResolver + 'static,
    {
        let levels = levels_at_or_above(config.min_level);
        let cancel = parent.child_token();

        let provisioned = match provision(store.as_ref(), &index, &cancel).await {
            Ok(provisioned) => provisioned,
            Err(err) => {
                cancel.cancel();
                return Err(err);
            }
        };

        let stats = Arc::new(DeliveryStats::default());
        let delivery = Delivery::new(
            config.strategy,
            store,
            cancel.clone(),
            Arc::clone(&stats),
            config.max_in_flight,
            &config.bulk,
        );

        info!(
            index = %provisioned,
            host = %config.host,
            min_level = %config.min_level,
            strategy = %config.strategy,
            "log hook ready"
        );

        Ok(LogHook {
            host: config.host,
            index: Box::new(index),
            levels,
            cancel,
            stats,
            delivery,
        })
    }

    /// Encode `record` and deliver it to the currently resolved index.
    ///
    /// Records whose level is not in [`LogHook::levels`] are ignored.
    /// Only [`StrategyKind::Sync`] can return an error; the other
    /// strategies report failures through logging and [`LogHook::stats`].
    pub async fn fire(&self, record: &LogRecord) -> Result<(), DeliveryError> {
        if !self.accepts(record.level) {
            return Ok(());
        }
        DeliveryStats::add(&self.stats.fired, 1);

        let document = Document::encode(record, &self.host);
        self.delivery.deliver(self.index.resolve(), document).await
    }

    /// Severities this hook reacts to, most severe first.
    pub fn levels(&self) -> &[Severity] {
        &self.levels
    }

    pub fn accepts(&self, level: Severity) -> bool {
        self.levels.contains(&level)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn strategy(&self) -> StrategyKind {
        self.delivery.kind()
    }

    /// Move to the cancelled state. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ship whatever the bulk queue holds and wait for the submission.
    pub async fn flush(&self) -> Result<BulkResponse, BulkError> {
        self.delivery.flush().await
    }

    /// Flush, stop background delivery and cancel the hook.
    pub async fn close(&self) -> Result<BulkResponse, BulkError> {
        let flushed = self.delivery.close().await;
        self.cancel();
        flushed
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
