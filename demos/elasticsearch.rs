use tracing::{error, info, warn};
use tracing_es_hook::init::{install_from_env, LayerConfig};

#[tokio::main]
async fn main() {
    // Example DSN: elasticsearch://localhost:9200/logs
    // ES_HOOK_STRATEGY=bulk ES_HOOK_FLUSH_INTERVAL_SECS=1 switches to bulk delivery.
    let hook = match install_from_env(LayerConfig::default()).await {
        Ok(hook) => hook,
        Err(e) => {
            eprintln!("cannot install elasticsearch hook: {}", e);
            std::process::exit(1);
        }
    };

    info!(strategy = %hook.strategy(), "elasticsearch demo started");
    warn!(latency_ms = 812u64, "slow upstream response");
    error!(order_id = 1234u64, reason = "card declined", "payment failed");

    if let Err(e) = hook.close().await {
        eprintln!("final flush failed: {}", e);
    }
}
