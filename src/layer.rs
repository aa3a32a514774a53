use crate::hook::LogHook;
use crate::record::{CapturedError, FieldValue, LogRecord};
use crate::severity::Severity;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor, TryCurrentError};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event targets never shipped: this crate and the HTTP stack beneath
/// the store would otherwise feed their own diagnostics back into the
/// hook.
const INTERNAL_TARGETS: &[&str] = &[
    "tracing_es_hook",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
];

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// fires them through a [`LogHook`].
///
/// Only events whose level is in [`LogHook::levels`] are fired. On a
/// multi-thread runtime the emitting thread waits for `fire`, so a hook
/// using [`StrategyKind::Sync`](crate::delivery::StrategyKind::Sync)
/// back-pressures the application; on a current-thread runtime `fire` is
/// spawned instead.
pub struct EsHookLayer {
    hook: Arc<LogHook>,
    runtime: Handle,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the hook.
    pub fired_events: Arc<AtomicU64>,
    /// Events whose `fire` returned an error.
    pub failed_events: Arc<AtomicU64>,
}

impl EsHookLayer {
    /// Build a layer bound to the tokio runtime this is called from.
    pub fn new(hook: Arc<LogHook>) -> Result<Self, TryCurrentError> {
        Ok(Self::with_runtime(hook, Handle::try_current()?))
    }

    /// Build a layer that drives `fire` on `runtime` for events emitted
    /// outside any tokio runtime.
    pub fn with_runtime(hook: Arc<LogHook>, runtime: Handle) -> Self {
        Self {
            hook,
            runtime,
            total_events: Arc::new(AtomicU64::new(0)),
            fired_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn hook(&self) -> &Arc<LogHook> {
        &self.hook
    }

    fn dispatch(&self, record: LogRecord) {
        self.fired_events.fetch_add(1, Ordering::Relaxed);

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let result =
                    tokio::task::block_in_place(|| handle.block_on(self.hook.fire(&record)));
                report(&self.failed_events, result);
            }
            Ok(handle) => {
                let hook = Arc::clone(&self.hook);
                let failed = Arc::clone(&self.failed_events);
                handle.spawn(async move {
                    report(&failed, hook.fire(&record).await);
                });
            }
            Err(_) => {
                let result = self.runtime.block_on(self.hook.fire(&record));
                report(&self.failed_events, result);
            }
        }
    }
}

fn report(failed: &AtomicU64, result: Result<(), crate::delivery::DeliveryError>) {
    if let Err(e) = result {
        failed.fetch_add(1, Ordering::Relaxed);
        eprintln!("error shipping log record: {}", e);
    }
}

fn is_internal(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .map_or(false, |rest| rest.starts_with("::"))
    })
}

impl<S> Layer<S> for EsHookLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if is_internal(meta.target()) {
            return;
        }
        let level = Severity::from(*meta.level());
        if !self.hook.accepts(level) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let record = LogRecord {
            level,
            timestamp: Utc::now(),
            message: message.unwrap_or_default(),
            fields,
        };

        self.dispatch(record);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, FieldValue::Error(Arc::new(CapturedError::capture(value))));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, FieldValue::from(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_targets_match_whole_path_segments() {
        assert!(is_internal("tracing_es_hook"));
        assert!(is_internal("tracing_es_hook::bulk"));
        assert!(is_internal("hyper::proto::h1"));
        assert!(!is_internal("hyperion::api"));
        assert!(!is_internal("my_app::handlers"));
    }
}
