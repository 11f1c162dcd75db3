//! Cache Index Module
//!
//! Map from key to [`CacheEntry`]. Orchestrates creation, lookup, removal,
//! persistence round-trips and reconciliation of changes made by other
//! contexts sharing the same durable store.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, CachedValue, Expiration, Snapshot, MAX_KEY_LENGTH};
use crate::config::{CacheConfig, CacheOptions, EntryConfig, ObjectKind};
use crate::error::{CacheError, Result};
use crate::storage::StorageHandle;
use crate::sync::{ContextId, StorageEvent, SyncBus};
use crate::tasks::ExpiryScheduler;

// == Lookup ==
/// Result of a lookup that distinguishes unresolved observables.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Value available
    Hit(Value),
    /// Observable entry exists but its value is still being produced
    Pending(Arc<OnceCell<Value>>),
    /// No live entry
    Miss,
}

// == Cache Index ==
/// Process-wide cache state. Shared as `Arc<RwLock<CacheIndex>>`.
#[derive(Debug)]
pub struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
    config: CacheConfig,
    storage: StorageHandle,
    bus: Option<SyncBus>,
    context: ContextId,
    stats: CacheStats,
    scheduler: ExpiryScheduler,
    listener: Option<JoinHandle<()>>,
}

impl CacheIndex {
    // == Constructor ==
    /// Creates an empty shared index.
    ///
    /// Expiry timers hold a weak reference back to the returned lock.
    pub fn new_shared(
        config: CacheConfig,
        storage: StorageHandle,
        bus: Option<SyncBus>,
    ) -> Arc<RwLock<CacheIndex>> {
        Arc::new_cyclic(|weak: &Weak<RwLock<CacheIndex>>| {
            RwLock::new(CacheIndex {
                entries: HashMap::new(),
                config,
                storage,
                bus,
                context: ContextId::allocate(),
                stats: CacheStats::new(),
                scheduler: ExpiryScheduler::new(weak.clone()),
                listener: None,
            })
        })
    }

    /// Keeps the sync listener task alive for as long as the index lives.
    pub fn attach_listener(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.listener.replace(handle) {
            previous.abort();
        }
    }

    // == Get ==
    /// Returns the value for `key` if present, not expired and resolved.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        match self.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Pending(_) | Lookup::Miss => None,
        }
    }

    /// Like [`get`](Self::get) but hands out the slot of an unresolved
    /// observable so the caller can wait on it.
    pub fn lookup(&mut self, key: &str) -> Lookup {
        if !self.check_entry(key, None) {
            debug!(key, "Cache miss");
            self.stats.record_miss();
            return Lookup::Miss;
        }

        let Some(entry) = self.entries.get(key) else {
            self.stats.record_miss();
            return Lookup::Miss;
        };

        match (entry.value().resolved(), entry.value().slot()) {
            (Some(value), _) => {
                debug!(key, "Cache hit");
                self.stats.record_hit();
                Lookup::Hit(value)
            }
            (None, Some(slot)) => {
                debug!(key, "Cache miss on pending observable");
                self.stats.record_miss();
                Lookup::Pending(slot.clone())
            }
            (None, None) => {
                self.stats.record_miss();
                Lookup::Miss
            }
        }
    }

    // == Has ==
    /// Whether a live entry exists for `key`.
    pub fn has(&mut self, key: &str) -> bool {
        self.check_entry(key, None)
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous value and restarting
    /// its expiration window.
    ///
    /// Only an invalid key is reported; persistence faults are absorbed.
    pub fn set(&mut self, key: &str, value: Value, options: &CacheOptions) -> Result<()> {
        validate_key(key)?;
        let config = options.resolve(&self.config.entry_defaults());
        let cached = CachedValue::for_kind(config.object_kind, value);
        self.upsert(key, cached, config);
        Ok(())
    }

    /// Creates an unresolved observable entry and returns its slot.
    pub fn insert_pending(
        &mut self,
        key: &str,
        options: &CacheOptions,
    ) -> Result<Arc<OnceCell<Value>>> {
        validate_key(key)?;
        let mut config = options.resolve(&self.config.entry_defaults());
        config.object_kind = ObjectKind::Observable;

        let slot = Arc::new(OnceCell::new());
        self.upsert(key, CachedValue::Observable(slot.clone()), config);
        Ok(slot)
    }

    /// Called once an observable slot resolved: writes the value through to
    /// durable storage and other contexts if the entry still owns `slot`.
    pub fn observable_resolved(&mut self, key: &str, slot: &Arc<OnceCell<Value>>) {
        if self.owns_slot(key, slot) {
            self.propagate_write(key, false);
        }
    }

    /// Removes `key` after its fetch failed, unless the entry was replaced
    /// in the meantime.
    pub fn remove_pending(&mut self, key: &str, slot: &Arc<OnceCell<Value>>) -> bool {
        self.owns_slot(key, slot) && slot.get().is_none() && self.remove(key)
    }

    fn owns_slot(&self, key: &str, slot: &Arc<OnceCell<Value>>) -> bool {
        self.entries
            .get(key)
            .and_then(|entry| entry.value().slot())
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    fn upsert(&mut self, key: &str, value: CachedValue, config: EntryConfig) {
        let was_persistent = match self.entries.get_mut(key) {
            Some(entry) => {
                let was_persistent = entry.config().is_persistent();
                entry.update(value, config, &self.scheduler);
                was_persistent
            }
            None => {
                let entry = CacheEntry::new(key, value, config, &self.scheduler);
                self.entries.insert(key.to_string(), entry);
                false
            }
        };

        debug!(key, duration = ?config.duration, storage = %config.storage_kind, "Cache set");
        self.propagate_write(key, was_persistent);
    }

    /// Mirrors the entry under `key` into durable storage and onto the bus.
    fn propagate_write(&mut self, key: &str, was_persistent: bool) {
        let Some(entry) = self.entries.get(key) else {
            return;
        };
        let config = *entry.config();
        let storage_key = self.config.storage_key(key);

        // Nothing to mirror until an observable resolves; drop any stale copy
        if entry.value().resolved().is_none() {
            if config.is_persistent() || was_persistent {
                self.storage.remove(&storage_key);
            }
            return;
        }

        let serialized = match entry.snapshot().to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(key, "Failed to serialize snapshot, keeping entry in memory only: {}", e);
                return;
            }
        };

        let old_value = if config.share_across_contexts {
            self.storage.read(&storage_key)
        } else {
            None
        };

        if config.is_persistent() {
            if !self.storage.write(&storage_key, &serialized) {
                // An older snapshot must not outlive the value that replaced it
                self.storage.remove(&storage_key);
            }
        } else if was_persistent {
            self.storage.remove(&storage_key);
        }

        if config.share_across_contexts {
            self.publish(StorageEvent {
                key: storage_key,
                old_value,
                new_value: Some(serialized),
                origin: self.context,
            });
        }
    }

    // == Remove ==
    /// Removes `key` and its durable copy. No-op when absent.
    pub fn remove(&mut self, key: &str) -> bool {
        self.remove_entry(key, true)
    }

    fn remove_entry(&mut self, key: &str, notify: bool) -> bool {
        let Some(mut entry) = self.entries.remove(key) else {
            return false;
        };
        entry.cancel_timer();

        let storage_key = self.config.storage_key(key);
        let old_value = if notify && entry.config().share_across_contexts {
            self.storage.read(&storage_key)
        } else {
            None
        };
        self.storage.remove(&storage_key);

        if notify && entry.config().share_across_contexts {
            self.publish(StorageEvent {
                key: storage_key,
                old_value,
                new_value: None,
                origin: self.context,
            });
        }

        debug!(key, "Cache entry removed");
        true
    }

    fn expire(&mut self, key: &str, notify: bool) {
        if self.remove_entry(key, notify) {
            self.stats.record_expiration();
            debug!(key, "Cache entry expired");
        }
    }

    /// Evicts `key` if `timer_id` is still its current timer.
    ///
    /// Invoked by expiry timers; a stale timer is ignored.
    pub fn expire_if_current(&mut self, key: &str, timer_id: u64) -> bool {
        let current = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_current_timer(timer_id));
        if current {
            self.expire(key, true);
        }
        current
    }

    // == Clear ==
    /// Removes every entry and its durable copy. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        let count = keys.len();
        for key in keys {
            self.remove_entry(&key, true);
        }
        info!("Cache cleared: removed {} entries", count);
        count
    }

    // == Expiration Check ==
    /// Runs the entry's expiration check; returns whether it is still live.
    fn check_entry(&mut self, key: &str, override_expires_at: Option<i64>) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        match entry.check_expiration(override_expires_at, &self.scheduler) {
            Expiration::Expired => {
                self.expire(key, true);
                false
            }
            Expiration::Never | Expiration::Armed(_) => true,
        }
    }

    // == Load From Persistent Store ==
    /// Rehydrates every snapshot stored under the configured prefix.
    ///
    /// Expired snapshots are evicted (and deleted from the store) right away;
    /// corrupt ones are logged and deleted. Returns the number of live entries
    /// loaded.
    pub fn load_from_persistent_store(&mut self) -> usize {
        let prefix = self.config.local_storage_prefix.clone();
        let mut loaded = 0;
        let mut expired = 0;

        for storage_key in self.storage.keys_with_prefix(&prefix) {
            let key = storage_key[prefix.len()..].to_string();
            let Some(raw) = self.storage.read(&storage_key) else {
                continue;
            };

            let mut snapshot = match Snapshot::from_json(&raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(key = %storage_key, "Discarding corrupt snapshot: {}", e);
                    self.storage.remove(&storage_key);
                    continue;
                }
            };
            if snapshot.key != key {
                warn!(
                    key = %storage_key,
                    "Snapshot key '{}' does not match its storage key", snapshot.key
                );
                snapshot.key = key.clone();
            }

            let expires_at = snapshot.expires_at;
            self.entries
                .insert(key.clone(), CacheEntry::from_snapshot(snapshot));
            if self.check_entry(&key, expires_at) {
                loaded += 1;
            } else {
                expired += 1;
            }
        }

        info!(
            "Loaded {} entries from persistent store ({} expired)",
            loaded, expired
        );
        loaded
    }

    // == Cross-context Reconciliation ==
    /// Applies a change made by another context. Never re-broadcasts.
    pub fn apply_remote_change(&mut self, event: &StorageEvent) {
        if event.origin == self.context {
            return;
        }
        let Some(key) = event
            .key
            .strip_prefix(self.config.local_storage_prefix.as_str())
            .map(str::to_string)
        else {
            return;
        };

        let Some(raw) = event.new_value.as_deref() else {
            if let Some(mut entry) = self.entries.remove(&key) {
                entry.cancel_timer();
                debug!(key = %key, "Removed entry after remote removal");
            }
            return;
        };

        let mut snapshot = match Snapshot::from_json(raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = %key, "Ignoring undecodable remote change: {}", e);
                return;
            }
        };
        if !snapshot.configuration.share_across_contexts {
            return;
        }
        snapshot.key = key.clone();

        let expires_at = snapshot.expires_at;
        self.entries
            .insert(key.clone(), CacheEntry::from_snapshot(snapshot));
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.check_expiration(expires_at, &self.scheduler) == Expiration::Expired {
                self.expire(&key, false);
                return;
            }
        }
        debug!(key = %key, "Applied remote update");
    }

    fn publish(&self, event: StorageEvent) {
        if let Some(bus) = &self.bus {
            let receivers = bus.publish(event);
            debug!(receivers, "Published storage event");
        }
    }

    // == Introspection ==
    /// Snapshot of the live entry under `key`, without an expiration check.
    pub fn snapshot(&self, key: &str) -> Option<Snapshot> {
        self.entries.get(key).map(CacheEntry::snapshot)
    }

    /// Remaining lifetime of `key` in seconds, `None` if absent or unbounded.
    pub fn ttl_remaining(&self, key: &str) -> Option<u64> {
        self.entries.get(key).and_then(CacheEntry::ttl_remaining)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.persistence_failures = self.storage.failures();
        stats
    }

    /// Cancels every timer and the sync listener while keeping entries and
    /// durable data in place.
    pub fn shutdown(&mut self) {
        for entry in self.entries.values_mut() {
            entry.cancel_timer();
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        info!("Cache timers stopped for {} entries", self.entries.len());
    }
}

impl Drop for CacheIndex {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::current_timestamp_ms;
    use crate::config::StorageKind;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn index_with_store() -> (Arc<RwLock<CacheIndex>>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let index = CacheIndex::new_shared(
            CacheConfig::default(),
            StorageHandle::new(store.clone()),
            None,
        );
        (index, store)
    }

    fn persisted(store: &MemoryStore, key: &str) -> Option<Snapshot> {
        use crate::storage::PersistentStore;
        store
            .get_item(&CacheConfig::default().storage_key(key))
            .unwrap()
            .map(|raw| Snapshot::from_json(&raw).unwrap())
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        index.set("k", json!({"id": 1}), &CacheOptions::new()).unwrap();

        assert_eq!(index.get("k"), Some(json!({"id": 1})));
        assert!(index.has("k"));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        assert_eq!(index.get("missing"), None);
        assert!(!index.has("missing"));
        assert_eq!(index.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        assert!(matches!(
            index.set("", json!(1), &CacheOptions::new()),
            Err(CacheError::InvalidKey(_))
        ));
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            index.set(&long_key, json!(1), &CacheOptions::new()),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        index.set("k", json!(1), &CacheOptions::new()).unwrap();
        assert!(index.remove("k"));
        assert!(!index.remove("k"));
        assert_eq!(index.get("k"), None);
    }

    #[tokio::test]
    async fn test_persistent_set_writes_snapshot() {
        let (index, store) = index_with_store();
        let mut index = index.write().await;

        index
            .set("k", json!("v"), &CacheOptions::new().persistent().duration(100))
            .unwrap();

        let snapshot = persisted(&store, "k").unwrap();
        assert_eq!(snapshot.key, "k");
        assert_eq!(snapshot.value, json!("v"));
        assert_eq!(snapshot.configuration.duration, Some(100));
        assert_eq!(snapshot.expires_at, Some(snapshot.last_update + 100_000));

        index.remove("k");
        assert!(persisted(&store, "k").is_none());
    }

    #[tokio::test]
    async fn test_in_memory_set_leaves_store_untouched() {
        let (index, store) = index_with_store();
        let mut index = index.write().await;

        index.set("k", json!("v"), &CacheOptions::new()).unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_switching_to_in_memory_drops_durable_copy() {
        let (index, store) = index_with_store();
        let mut index = index.write().await;

        index
            .set("k", json!(1), &CacheOptions::new().persistent())
            .unwrap();
        assert!(persisted(&store, "k").is_some());

        index
            .set("k", json!(2), &CacheOptions::new().storage_kind(StorageKind::InMemory))
            .unwrap();
        assert!(persisted(&store, "k").is_none());
        assert_eq!(index.get("k"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (index, store) = index_with_store();
        let mut index = index.write().await;

        index.set("a", json!(1), &CacheOptions::new()).unwrap();
        index
            .set("b", json!(2), &CacheOptions::new().persistent())
            .unwrap();

        assert_eq!(index.clear(), 2);
        assert!(index.is_empty());
        assert!(store.is_empty());
        assert_eq!(index.get("a"), None);
    }

    #[tokio::test]
    async fn test_stale_timer_is_ignored() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        index
            .set("k", json!(1), &CacheOptions::new().duration(60))
            .unwrap();

        assert!(!index.expire_if_current("k", u64::MAX));
        assert!(index.has("k"));
        assert!(!index.expire_if_current("missing", 1));
    }

    #[tokio::test]
    async fn test_timer_evicts_entry() {
        let (index, store) = index_with_store();

        index
            .write()
            .await
            .set("k", json!(1), &CacheOptions::new().duration(1).persistent())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1300)).await;

        let index = index.read().await;
        assert_eq!(index.len(), 0, "Timer should have removed the entry");
        assert_eq!(index.stats().expirations, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_persistent_store() {
        let store = Arc::new(MemoryStore::new());
        {
            let first = CacheIndex::new_shared(
                CacheConfig::default(),
                StorageHandle::new(store.clone()),
                None,
            );
            let mut first = first.write().await;
            first
                .set("keep", json!([1, 2]), &CacheOptions::new().persistent().duration(100))
                .unwrap();
            first
                .set("forever", json!("x"), &CacheOptions::new().persistent())
                .unwrap();
            first.shutdown();
        }

        let second = CacheIndex::new_shared(
            CacheConfig::default(),
            StorageHandle::new(store.clone()),
            None,
        );
        let mut second = second.write().await;
        assert_eq!(second.load_from_persistent_store(), 2);
        assert_eq!(second.get("keep"), Some(json!([1, 2])));
        assert_eq!(second.get("forever"), Some(json!("x")));

        let ttl = second.ttl_remaining("keep").unwrap();
        assert!(ttl <= 100 && ttl >= 98);
    }

    #[tokio::test]
    async fn test_load_discards_corrupt_snapshots() {
        use crate::storage::PersistentStore;

        let store = Arc::new(MemoryStore::new());
        store.set_item("ngxLiquidCache_bad", "{oops").unwrap();
        store.set_item("unrelated", "{oops").unwrap();

        let index = CacheIndex::new_shared(
            CacheConfig::default(),
            StorageHandle::new(store.clone()),
            None,
        );
        let mut index = index.write().await;

        assert_eq!(index.load_from_persistent_store(), 0);
        assert!(store.get_item("ngxLiquidCache_bad").unwrap().is_none());
        assert!(store.get_item("unrelated").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remote_changes_are_reconciled() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;
        let remote = ContextId::allocate();

        let snapshot = Snapshot {
            key: "k".to_string(),
            value: json!("remote"),
            configuration: EntryConfig {
                duration: Some(60),
                share_across_contexts: true,
                ..EntryConfig::default()
            },
            expires_at: Some(current_timestamp_ms() + 60_000),
            last_update: current_timestamp_ms(),
        };
        index.apply_remote_change(&StorageEvent {
            key: "ngxLiquidCache_k".to_string(),
            old_value: None,
            new_value: Some(snapshot.to_json().unwrap()),
            origin: remote,
        });
        assert_eq!(index.get("k"), Some(json!("remote")));

        index.apply_remote_change(&StorageEvent {
            key: "ngxLiquidCache_k".to_string(),
            old_value: Some(snapshot.to_json().unwrap()),
            new_value: None,
            origin: remote,
        });
        assert_eq!(index.get("k"), None);
    }

    #[tokio::test]
    async fn test_remote_changes_filtered() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        let unshared = Snapshot {
            key: "k".to_string(),
            value: json!(1),
            configuration: EntryConfig::default(),
            expires_at: None,
            last_update: 0,
        };
        index.apply_remote_change(&StorageEvent {
            key: "ngxLiquidCache_k".to_string(),
            old_value: None,
            new_value: Some(unshared.to_json().unwrap()),
            origin: ContextId::allocate(),
        });
        assert!(!index.has("k"));

        // Own events and foreign prefixes are ignored
        index.set("mine", json!(1), &CacheOptions::new()).unwrap();
        let own = index.context();
        index.apply_remote_change(&StorageEvent {
            key: "ngxLiquidCache_mine".to_string(),
            old_value: None,
            new_value: None,
            origin: own,
        });
        index.apply_remote_change(&StorageEvent {
            key: "mine".to_string(),
            old_value: None,
            new_value: None,
            origin: ContextId::allocate(),
        });
        assert!(index.has("mine"));
    }

    #[tokio::test]
    async fn test_pending_observable_lookup() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        let slot = index.insert_pending("obs", &CacheOptions::new()).unwrap();
        assert!(matches!(index.lookup("obs"), Lookup::Pending(_)));
        assert_eq!(index.get("obs"), None);

        let stats = index.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);

        slot.set(json!("done")).unwrap();
        assert!(matches!(index.lookup("obs"), Lookup::Hit(v) if v == json!("done")));
        assert_eq!(index.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_remove_pending_only_removes_owned_slot() {
        let (index, _) = index_with_store();
        let mut index = index.write().await;

        let stale = index.insert_pending("obs", &CacheOptions::new()).unwrap();
        let current = index.insert_pending("obs", &CacheOptions::new()).unwrap();

        assert!(!index.remove_pending("obs", &stale));
        assert!(index.has("obs"));
        assert!(index.remove_pending("obs", &current));
        assert!(!index.has("obs"));
    }

    #[tokio::test]
    async fn test_failed_overwrite_drops_stale_durable_copy() {
        let store = Arc::new(MemoryStore::with_quota(512));
        let index = CacheIndex::new_shared(
            CacheConfig::default(),
            StorageHandle::new(store.clone()),
            None,
        );
        let mut index = index.write().await;

        index
            .set("k", json!("v1"), &CacheOptions::new().persistent())
            .unwrap();
        assert!(persisted(&store, "k").is_some());

        let big = json!("x".repeat(1024));
        index
            .set("k", big.clone(), &CacheOptions::new().persistent())
            .unwrap();

        assert_eq!(index.get("k"), Some(big));
        assert!(persisted(&store, "k").is_none());
        assert_eq!(index.stats().persistence_failures, 1);
    }
}
