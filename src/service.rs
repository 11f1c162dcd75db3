//! Liquid Cache Service
//!
//! The cloneable handle callers use. Wraps the shared [`CacheIndex`] and wires
//! up the durable store, the sync bus and startup rehydration.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{CacheIndex, CacheStats, Lookup, Snapshot};
use crate::config::{CacheConfig, CacheOptions};
use crate::error::{CacheError, Result};
use crate::storage::{PersistentStore, StorageHandle};
use crate::sync::SyncBus;
use crate::tasks::spawn_sync_listener;

// == Liquid Cache ==
/// Thread-safe cache handle. Clones share the same index.
#[derive(Clone, Debug)]
pub struct LiquidCache {
    index: Arc<RwLock<CacheIndex>>,
}

impl LiquidCache {
    /// Creates an in-memory cache with the given defaults and no durable store.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            index: CacheIndex::new_shared(config, StorageHandle::disabled(), None),
        }
    }

    pub fn builder() -> LiquidCacheBuilder {
        LiquidCacheBuilder::default()
    }

    // == Get ==
    /// Returns the cached value, or `None` on a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.index.write().await.get(key)
    }

    /// Returns the cached value decoded as `T`. A value that does not decode is
    /// reported as a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, "Cached value does not decode to the requested type: {}", e);
                None
            }
        }
    }

    // == Has ==
    pub async fn has(&self, key: &str) -> bool {
        self.index.write().await.has(key)
    }

    // == Set ==
    /// Stores `value` under `key` with per-call overrides.
    pub async fn set(&self, key: &str, value: impl Into<Value>, options: CacheOptions) -> Result<()> {
        self.index.write().await.set(key, value.into(), &options)
    }

    // == Remove ==
    /// Removes `key`; absent keys are ignored.
    pub async fn remove(&self, key: &str) {
        self.index.write().await.remove(key);
    }

    // == Clear ==
    /// Removes every entry. Returns the number removed.
    pub async fn clear(&self) -> usize {
        self.index.write().await.clear()
    }

    // == Get Or Fetch ==
    /// Returns the cached value for `key`, producing it with `fetch` on a miss.
    ///
    /// The entry is observable-kind: `fetch` runs at most once per entry
    /// lifetime and concurrent callers wait for the same result.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, options: CacheOptions, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Value>,
    {
        self.try_get_or_fetch(key, options, || async move {
            Ok::<Value, CacheError>(fetch().await)
        })
        .await
    }

    /// Fallible [`get_or_fetch`](Self::get_or_fetch). A failed fetch leaves
    /// no entry behind, so the next caller retries.
    pub async fn try_get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        options: CacheOptions,
        fetch: F,
    ) -> std::result::Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: From<CacheError>,
    {
        let slot = {
            let mut index = self.index.write().await;
            match index.lookup(key) {
                Lookup::Hit(value) => return Ok(value),
                Lookup::Pending(slot) => slot,
                Lookup::Miss => index.insert_pending(key, &options)?,
            }
        };

        match slot.get_or_try_init(fetch).await {
            Ok(value) => {
                let value = value.clone();
                self.index.write().await.observable_resolved(key, &slot);
                Ok(value)
            }
            Err(e) => {
                self.index.write().await.remove_pending(key, &slot);
                Err(e)
            }
        }
    }

    // == Persistence ==
    /// Rehydrates entries from the durable store; see
    /// [`CacheIndex::load_from_persistent_store`].
    pub async fn load_from_persistent_store(&self) -> usize {
        self.index.write().await.load_from_persistent_store()
    }

    // == Introspection ==
    pub async fn snapshot(&self, key: &str) -> Option<Snapshot> {
        self.index.read().await.snapshot(key)
    }

    pub async fn ttl_remaining(&self, key: &str) -> Option<u64> {
        self.index.read().await.ttl_remaining(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.index.read().await.keys()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.index.read().await.stats()
    }

    /// Stops all timers and the sync listener. Entries stay readable and
    /// durable data is left untouched.
    pub async fn shutdown(&self) {
        self.index.write().await.shutdown();
    }
}

// == Builder ==
/// Builds a [`LiquidCache`] with optional durable store and sync bus.
#[derive(Default)]
pub struct LiquidCacheBuilder {
    config: CacheConfig,
    store: Option<Arc<dyn PersistentStore>>,
    bus: Option<SyncBus>,
    skip_load: bool,
}

impl LiquidCacheBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable store used for persistent-kind entries.
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Channel shared with other contexts on the same store.
    pub fn sync_bus(mut self, bus: SyncBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Skips rehydration from the durable store at build time.
    pub fn skip_load(mut self) -> Self {
        self.skip_load = true;
        self
    }

    /// Creates the cache, starts the sync listener and rehydrates persisted
    /// entries. Must run inside a tokio runtime.
    pub async fn build(self) -> LiquidCache {
        let storage = match self.store {
            Some(store) => StorageHandle::new(store),
            None => StorageHandle::disabled(),
        };
        let has_storage = storage.is_available();
        let rx = self.bus.as_ref().map(SyncBus::subscribe);

        let index = CacheIndex::new_shared(self.config, storage, self.bus);

        if let Some(rx) = rx {
            let handle = spawn_sync_listener(Arc::downgrade(&index), rx);
            index.write().await.attach_listener(handle);
        }

        if has_storage && !self.skip_load {
            let loaded = index.write().await.load_from_persistent_store();
            info!("Cache ready with {} rehydrated entries", loaded);
        }

        LiquidCache { index }
    }
}
