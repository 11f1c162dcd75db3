//! Expiry Timers
//!
//! One tokio task per armed entry. The task sleeps for the entry's remaining
//! lifetime, then asks the index to evict the entry if the timer is still the
//! entry's current one.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheIndex;

/// Spawns expiry timers that refer back to an index without keeping it alive.
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    index: Weak<RwLock<CacheIndex>>,
}

impl ExpiryScheduler {
    pub fn new(index: Weak<RwLock<CacheIndex>>) -> Self {
        Self { index }
    }

    /// A scheduler bound to no index; it never spawns anything.
    pub fn detached() -> Self {
        Self { index: Weak::new() }
    }

    /// Spawns a timer evicting `key` after `delay`.
    ///
    /// Returns `None` when there is no index to evict from or no tokio runtime
    /// to run the timer on; lazy expiration checks still apply in that case.
    ///
    /// # Example
    /// ```ignore
    /// let handle = scheduler.schedule("all".to_string(), timer_id, Duration::from_secs(60));
    /// // Later, when the entry is updated or removed:
    /// handle.map(|h| h.abort());
    /// ```
    pub fn schedule(&self, key: String, timer_id: u64, delay: Duration) -> Option<JoinHandle<()>> {
        if self.index.strong_count() == 0 {
            return None;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(key = %key, "No tokio runtime, expiry timer not armed");
                return None;
            }
        };

        let index = self.index.clone();
        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(index) = index.upgrade() else {
                return;
            };
            let evicted = index.write().await.expire_if_current(&key, timer_id);
            if evicted {
                debug!(key = %key, "Expiry timer evicted entry");
            } else {
                debug!(key = %key, "Expiry timer was stale");
            }
        }))
    }
}
