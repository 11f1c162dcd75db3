//! Cross-context Sync Module
//!
//! A same-origin change channel. Every cache instance sharing a durable store
//! can also share a [`SyncBus`]; writes and removals of shared entries are
//! published as [`StorageEvent`]s and reconciled by the other instances.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

// == Context Id ==
/// Identifies the cache instance that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a process-unique id.
    pub fn allocate() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// == Storage Event ==
/// A change to one durable-store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    /// Full durable key (`prefix + cache key`)
    pub key: String,
    /// Serialized snapshot before the change
    pub old_value: Option<String>,
    /// Serialized snapshot after the change, `None` = removed
    pub new_value: Option<String>,
    /// Instance that made the change
    pub origin: ContextId,
}

// == Sync Bus ==
/// Broadcast channel of [`StorageEvent`]s. Cloning yields another sender on
/// the same channel.
#[derive(Debug, Clone)]
pub struct SyncBus {
    tx: broadcast::Sender<StorageEvent>,
}

impl SyncBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event. Returns the number of subscribers that will see it.
    pub fn publish(&self, event: StorageEvent) -> usize {
        // No subscribers is not an error
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(key: &str, origin: ContextId) -> StorageEvent {
        StorageEvent {
            key: key.to_string(),
            old_value: None,
            new_value: Some("{}".to_string()),
            origin,
        }
    }

    #[test]
    fn test_context_ids_are_unique() {
        assert_ne!(ContextId::allocate(), ContextId::allocate());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = SyncBus::new();
        assert_eq!(bus.publish(event("k", ContextId::allocate())), 0);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_events() {
        let bus = SyncBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.clone().subscribe();

        let origin = ContextId::allocate();
        assert_eq!(bus.publish(event("p_k", origin)), 2);

        assert_eq!(rx1.recv().await.unwrap().key, "p_k");
        assert_eq!(rx2.recv().await.unwrap().origin, origin);
    }
}
