use crate::backend::{make_store_from_config, parse_dsn, BackendBuildError, DsnError};
use crate::env::{env_or, ConfigError, DEFAULT_INDEX, ES_HOOK_DSN_ENV, ES_HOOK_INDEX_ENV};
use crate::hook::{HookConfig, LogHook};
use crate::layer::EsHookLayer;
use crate::provision::ProvisionError;
use std::sync::Arc;
use tokio::runtime::TryCurrentError;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Subscriber options for [`init_tracing_with_config`].
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   stacked on top of [`EsHookLayer`] so events are also printed to the
///   console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self { enable_stdout: true }
    }
}

/// Errors raised while wiring the hook into the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid backend DSN: {0}")]
    Dsn(#[from] DsnError),

    #[error(transparent)]
    Backend(#[from] BackendBuildError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("no tokio runtime available: {0}")]
    Runtime(#[from] TryCurrentError),

    #[error(transparent)]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Install a global `tracing` subscriber that ships events through
/// `hook`.
///
/// **Parameters**
/// - `hook`: the [`LogHook`] events are fired into.
/// - `config`: [`LayerConfig`] controlling console output.
///
/// **Errors**
/// - [`InitError::Runtime`] when called outside a tokio runtime.
/// - [`InitError::Subscriber`] when a global subscriber is already set.
pub fn init_tracing_with_config(hook: Arc<LogHook>, config: LayerConfig) -> Result<(), InitError> {
    let layer = EsHookLayer::new(hook)?;

    // The fmt layer changes the subscriber's type, so each variant is
    // installed separately.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Install the hook with [`LayerConfig::default`].
pub fn init_tracing(hook: Arc<LogHook>) -> Result<(), InitError> {
    init_tracing_with_config(hook, LayerConfig::default())
}

/// Build everything from environment variables and install it.
///
/// Reads the backend from [`ES_HOOK_DSN_ENV`], the index from the DSN
/// path (or [`ES_HOOK_INDEX_ENV`], or [`DEFAULT_INDEX`]) and the hook
/// settings via [`HookConfig::from_env`]. Returns the installed hook so
/// the caller can flush and close it on shutdown.
pub async fn install_from_env(config: LayerConfig) -> Result<Arc<LogHook>, InitError> {
    let dsn = std::env::var(ES_HOOK_DSN_ENV).map_err(|_| ConfigError::Missing { key: ES_HOOK_DSN_ENV })?;
    let backend = parse_dsn(&dsn)?;
    let store = make_store_from_config(&backend)?;

    let index = backend
        .index
        .clone()
        .unwrap_or_else(|| env_or(ES_HOOK_INDEX_ENV, DEFAULT_INDEX));

    let hook = Arc::new(LogHook::new(store, HookConfig::from_env()?, index).await?);
    init_tracing_with_config(Arc::clone(&hook), config)?;
    Ok(hook)
}
