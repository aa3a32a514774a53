use crate::document::Document;
use crate::store::{BulkIndexRequest, BulkResponse, CreateIndexResponse, DocumentStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A store that keeps everything in process memory.
///
/// Useful for measuring the overhead of the hook itself without any
/// external I/O, and for tests that need to observe what was written or
/// to inject backend failures.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failures: Failures,
    write_latency: Option<Duration>,
}

#[derive(Default)]
struct MemoryState {
    indices: BTreeSet<String>,
    documents: Vec<(String, Document)>,
    bulk_batches: Vec<Vec<BulkIndexRequest>>,
    exists_calls: usize,
    create_calls: usize,
}

#[derive(Default)]
struct Failures {
    exists: Option<String>,
    create: Option<String>,
    unacknowledged: bool,
    writes: Option<u16>,
    bulk: Option<u16>,
    bulk_items: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create `index`.
    pub fn with_index(self, index: impl Into<String>) -> Self {
        self.lock().indices.insert(index.into());
        self
    }

    /// Make every existence check fail with a transport error.
    pub fn failing_exists(mut self, reason: impl Into<String>) -> Self {
        self.failures.exists = Some(reason.into());
        self
    }

    /// Make every index creation fail with a transport error.
    pub fn failing_create(mut self, reason: impl Into<String>) -> Self {
        self.failures.create = Some(reason.into());
        self
    }

    /// Answer index creation with `acknowledged: false`.
    pub fn unacknowledged_create(mut self) -> Self {
        self.failures.unacknowledged = true;
        self
    }

    /// Reject single-document writes with the given HTTP status.
    pub fn failing_writes(mut self, status: u16) -> Self {
        self.failures.writes = Some(status);
        self
    }

    /// Reject bulk submissions with the given HTTP status.
    pub fn failing_bulk(mut self, status: u16) -> Self {
        self.failures.bulk = Some(status);
        self
    }

    /// Accept bulk submissions but report the first `failed` items of
    /// each as rejected by the cluster.
    pub fn failing_bulk_items(mut self, failed: usize) -> Self {
        self.failures.bulk_items = Some(failed);
        self
    }

    /// Delay every single-document write and bulk submission.
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = Some(latency);
        self
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.lock().indices.contains(index)
    }

    /// Documents written through [`DocumentStore::index_document`].
    pub fn documents(&self) -> Vec<(String, Document)> {
        self.lock().documents.clone()
    }

    /// Every bulk submission received, in arrival order.
    pub fn bulk_batches(&self) -> Vec<Vec<BulkIndexRequest>> {
        self.lock().bulk_batches.clone()
    }

    pub fn exists_calls(&self) -> usize {
        self.lock().exists_calls
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.write_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.exists_calls += 1;
        if let Some(reason) = &self.failures.exists {
            return Err(StoreError::Transport(reason.clone()));
        }
        Ok(state.indices.contains(index))
    }

    async fn create_index(&self, index: &str) -> Result<CreateIndexResponse, StoreError> {
        let mut state = self.lock();
        state.create_calls += 1;
        if let Some(reason) = &self.failures.create {
            return Err(StoreError::Transport(reason.clone()));
        }
        if self.failures.unacknowledged {
            return Ok(CreateIndexResponse { acknowledged: false });
        }
        if !state.indices.insert(index.to_string()) {
            return Err(StoreError::IndexAlreadyExists(index.to_string()));
        }
        Ok(CreateIndexResponse { acknowledged: true })
    }

    async fn index_document(&self, index: &str, document: &Document) -> Result<(), StoreError> {
        self.simulate_latency().await;
        if let Some(status) = self.failures.writes {
            return Err(StoreError::Status {
                status,
                body: "write rejected".to_string(),
            });
        }
        self.lock()
            .documents
            .push((index.to_string(), document.clone()));
        Ok(())
    }

    async fn bulk(&self, requests: &[BulkIndexRequest]) -> Result<BulkResponse, StoreError> {
        self.simulate_latency().await;
        if let Some(status) = self.failures.bulk {
            return Err(StoreError::Status {
                status,
                body: "bulk rejected".to_string(),
            });
        }
        self.lock().bulk_batches.push(requests.to_vec());
        if let Some(failed) = self.failures.bulk_items {
            return Err(StoreError::BulkItems {
                failed: failed.min(requests.len()),
                first: "mapper_parsing_exception".to_string(),
            });
        }
        Ok(BulkResponse {
            items: requests.len(),
            took_ms: 0,
        })
    }
}
