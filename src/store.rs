use crate::document::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Asynchronous client for an Elasticsearch-like document store.
///
/// Implementations transport requests to a concrete backend (an HTTP
/// cluster, an in-memory fake, etc). One handle is shared read-only by
/// every hook and every delivery strategy, so implementations must be
/// safe for concurrent use.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Ask whether `index` exists.
    ///
    /// **Returns**
    /// - `Ok(true)` / `Ok(false)` when the backend answered.
    /// - `Err(..)` when the check itself could not complete.
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    /// Create `index`.
    ///
    /// A backend that rejects the request because the index already
    /// exists should report [`StoreError::IndexAlreadyExists`].
    async fn create_index(&self, index: &str) -> Result<CreateIndexResponse, StoreError>;

    /// Write a single document into `index`.
    async fn index_document(&self, index: &str, document: &Document) -> Result<(), StoreError>;

    /// Submit several index operations in one request.
    async fn bulk(&self, requests: &[BulkIndexRequest]) -> Result<BulkResponse, StoreError>;
}

/// Outcome of an index creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexResponse {
    pub acknowledged: bool,
}

/// One `index` action of a bulk submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkIndexRequest {
    pub index: String,
    pub document: Document,
}

impl BulkIndexRequest {
    pub fn new(index: impl Into<String>, document: Document) -> Self {
        BulkIndexRequest {
            index: index.into(),
            document,
        }
    }
}

/// Summary of a successful bulk submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkResponse {
    /// Number of actions the backend accepted.
    pub items: usize,
    /// Server-side processing time reported by the backend.
    pub took_ms: u64,
}

/// Errors reported by a [`DocumentStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("index {0:?} already exists")]
    IndexAlreadyExists(String),

    #[error("{failed} bulk item(s) failed, first error: {first}")]
    BulkItems { failed: usize, first: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
