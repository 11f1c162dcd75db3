//! Liquid Cache demo
//!
//! Drives the cache against a simulated slow API: two `find_all` calls and two
//! `find_one(1)` calls, where only the first of each pair reaches the API,
//! followed by clearing the cached responses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use liquid_cache::{CacheConfig, CacheOptions, FileStore, LiquidCache, MemoryStore, PersistentStore};

/// Simulated remote API with fixed latency.
struct FakeApi {
    latency: Duration,
    calls: AtomicUsize,
}

impl FakeApi {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            calls: AtomicUsize::new(0),
        }
    }

    async fn find_all(&self) -> Value {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        json!([{"id": 1}, {"id": 2}, {"id": 3}])
    }

    async fn find_one(&self, id: u64) -> Value {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        json!({"id": id})
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to debug for the cache, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "liquid_cache=debug,liquid_cache_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: prefix={}, duration={:?}, object_kind={}, storage_kind={}",
        config.local_storage_prefix, config.duration, config.object_kind, config.storage_kind
    );

    // LIQUID_CACHE_FILE selects a durable JSON file; otherwise storage is process-local
    let store: Arc<dyn PersistentStore> = match std::env::var("LIQUID_CACHE_FILE") {
        Ok(path) => {
            info!("Using durable store at {}", path);
            Arc::new(FileStore::new(path))
        }
        Err(_) => Arc::new(MemoryStore::new()),
    };

    let cache = LiquidCache::builder().config(config).store(store).build().await;
    let api = Arc::new(FakeApi::new(Duration::from_millis(500)));

    for attempt in 1..=2 {
        let started = Instant::now();
        let api = api.clone();
        let results = cache
            .get_or_fetch("all", CacheOptions::new().duration(60), || async move {
                api.find_all().await
            })
            .await?;
        info!("findAll call {} -> {} in {:?}", attempt, results, started.elapsed());
    }

    for attempt in 1..=2 {
        let started = Instant::now();
        let api = api.clone();
        let result = cache
            .get_or_fetch("single-1", CacheOptions::new().duration(0), || async move {
                api.find_one(1).await
            })
            .await?;
        info!("findOne call {} -> {} in {:?}", attempt, result, started.elapsed());
    }

    let stats = cache.stats().await;
    info!(
        "API calls: {}, cache hits: {}, misses: {}, hit rate: {:.2}",
        api.calls.load(Ordering::SeqCst),
        stats.hits,
        stats.misses,
        stats.hit_rate()
    );

    cache.remove("all").await;
    cache.remove("single-1").await;
    info!("Cache cleared, {} entries left", cache.len().await);

    cache.shutdown().await;
    Ok(())
}
