//! Storage Module
//!
//! Durable key-value stores the cache persists snapshots into, and the
//! [`StorageHandle`] boundary that keeps their failures away from callers.

mod file;
mod memory;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StorageError;

pub use file::FileStore;
pub use memory::MemoryStore;

// == Persistent Store ==
/// A synchronous, origin-scoped durable key-value store.
///
/// Every operation may fail: storage can be disabled, full, or broken.
pub trait PersistentStore: Send + Sync {
    /// Returns the raw item stored under `key`, if any.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous item.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes the item under `key`. Deleting a missing item is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Lists every key currently stored.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

// == Storage Handle ==
/// Fault-absorbing wrapper around an optional [`PersistentStore`].
///
/// Failures are logged and counted, never returned. Without a backing store
/// every write is a no-op and every read misses.
#[derive(Clone, Default)]
pub struct StorageHandle {
    store: Option<Arc<dyn PersistentStore>>,
    failures: Arc<AtomicU64>,
}

impl StorageHandle {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store: Some(store),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A handle with no durable store; persistence degrades to in-memory only.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Number of store operations that failed and were swallowed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Reads an item. Errors are logged and reported as absent.
    pub fn read(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get_item(key) {
            Ok(item) => item,
            Err(e) => {
                self.record_failure("read", key, &e);
                None
            }
        }
    }

    /// Writes an item. Returns `true` when the store accepted it.
    pub fn write(&self, key: &str, value: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            warn!(key, "No durable store configured, keeping entry in memory only");
            return false;
        };
        match store.set_item(key, value) {
            Ok(()) => {
                debug!(key, bytes = value.len(), "Persisted snapshot");
                true
            }
            Err(e) => {
                self.record_failure("write", key, &e);
                false
            }
        }
    }

    /// Removes an item if it exists. Returns `true` when an item was deleted.
    pub fn remove(&self, key: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        match store.get_item(key) {
            Ok(None) => false,
            Ok(Some(_)) => match store.remove_item(key) {
                Ok(()) => {
                    debug!(key, "Removed persisted snapshot");
                    true
                }
                Err(e) => {
                    self.record_failure("remove", key, &e);
                    false
                }
            },
            Err(e) => {
                self.record_failure("remove", key, &e);
                false
            }
        }
    }

    /// Lists stored keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Some(store) = self.store.as_ref() else {
            return Vec::new();
        };
        match store.keys() {
            Ok(keys) => keys.into_iter().filter(|k| k.starts_with(prefix)).collect(),
            Err(e) => {
                self.record_failure("scan", prefix, &e);
                Vec::new()
            }
        }
    }

    fn record_failure(&self, op: &str, key: &str, err: &StorageError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(key, "Durable store {} failed, continuing in memory: {}", op, err);
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("available", &self.is_available())
            .field("failures", &self.failures())
            .finish()
    }
}
