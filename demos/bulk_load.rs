use std::sync::Arc;
use std::time::Instant;

use tracing::error;
use tracing_es_hook::init::{init_tracing_with_config, LayerConfig};
use tracing_es_hook::memory_store::MemoryStore;
use tracing_es_hook::{BulkConfig, DocumentStore, HookConfig, LogHook, Severity, StrategyKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let config = HookConfig {
        min_level: Severity::Error,
        strategy: StrategyKind::Bulk,
        bulk: BulkConfig::default(),
        ..HookConfig::default()
    };
    let hook = Arc::new(LogHook::new(Arc::clone(&store) as Arc<dyn DocumentStore>, config, "load").await?);
    init_tracing_with_config(Arc::clone(&hook), LayerConfig { enable_stdout: false })?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "bulk load test error");
    }

    let elapsed = start.elapsed();
    println!("bulk strategy: fired {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    hook.close().await?;
    let shipped: usize = store.bulk_batches().iter().map(Vec::len).sum();
    println!("shipped {} documents in {} bulk submission(s)", shipped, store.bulk_batches().len());
    Ok(())
}
