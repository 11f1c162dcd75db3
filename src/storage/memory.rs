//! In-process durable store.
//!
//! Shared through an `Arc`, it stands in for origin-scoped storage that
//! outlives a single cache instance (simulated restarts, several contexts).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;
use crate::storage::PersistentStore;

/// Map-backed [`PersistentStore`] with an optional byte quota.
#[derive(Debug)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
    /// Maximum total size of keys plus values, in bytes
    quota_bytes: Option<usize>,
    enabled: AtomicBool,
}

impl MemoryStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            quota_bytes: None,
            enabled: AtomicBool::new(true),
        }
    }

    /// Creates a store that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    /// Enables or disables the store. A disabled store fails every operation.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("store is disabled".to_string()));
        }
        self.items
            .lock()
            .map_err(|_| StorageError::Unavailable("store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.lock()?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            if used + needed > quota {
                return Err(StorageError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set_item("a", "1").unwrap();
        store.set_item("a", "2").unwrap();
        assert_eq!(store.get_item("a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);

        store.remove_item("a").unwrap();
        store.remove_item("a").unwrap();
        assert_eq!(store.get_item("a").unwrap(), None);
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(10);

        store.set_item("k1", "abc").unwrap(); // 5 bytes
        let err = store.set_item("k2", "abcdef").unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded {
                needed: 8,
                available: 5
            }
        ));

        // Replacing an existing item only counts its new size
        store.set_item("k1", "abcdefgh").unwrap();
    }

    #[test]
    fn test_memory_store_disabled() {
        let store = MemoryStore::new();
        store.set_enabled(false);

        assert!(matches!(
            store.set_item("a", "1"),
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.keys().is_err());

        store.set_enabled(true);
        assert!(store.keys().unwrap().is_empty());
    }
}
