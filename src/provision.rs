use crate::index::IndexNameResolver;
use crate::store::{DocumentStore, StoreError};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors that abort hook construction while ensuring the target index.
#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("cannot check whether index {index:?} exists: {source}")]
    CheckFailed {
        index: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot create index {index:?}: {source}")]
    CreateFailed {
        index: String,
        #[source]
        source: StoreError,
    },

    #[error("creation of index {index:?} was not acknowledged")]
    NotAcknowledged { index: String },

    #[error("provisioning of index {index:?} was cancelled")]
    Cancelled { index: String },
}

/// Make sure the index currently named by `resolver` exists, creating it
/// when absent. Returns the provisioned index name.
///
/// Check and create are two separate requests, so a concurrent creator
/// can win the race in between; a create rejected with
/// [`StoreError::IndexAlreadyExists`] therefore counts as success.
pub async fn provision(
    store: &dyn DocumentStore,
    resolver: &dyn IndexNameResolver,
    cancel: &CancellationToken,
) -> Result<String, ProvisionError> {
    let index = resolver.resolve();

    let exists = match cancellable(cancel, store.index_exists(&index)).await {
        Some(Ok(exists)) => exists,
        Some(Err(source)) => return Err(ProvisionError::CheckFailed { index, source }),
        None => return Err(ProvisionError::Cancelled { index }),
    };
    if exists {
        debug!(%index, "index already present");
        return Ok(index);
    }

    match cancellable(cancel, store.create_index(&index)).await {
        Some(Ok(resp)) if resp.acknowledged => {
            debug!(%index, "index created");
            Ok(index)
        }
        Some(Ok(_)) => Err(ProvisionError::NotAcknowledged { index }),
        Some(Err(StoreError::IndexAlreadyExists(_))) => {
            debug!(%index, "index created concurrently by another writer");
            Ok(index)
        }
        Some(Err(source)) => Err(ProvisionError::CreateFailed { index, source }),
        None => Err(ProvisionError::Cancelled { index }),
    }
}

/// Run `fut` unless `cancel` fires first; `None` means cancelled.
pub(crate) async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
