//! Cross-context Sync Listener
//!
//! Background task that applies [`StorageEvent`]s published by other cache
//! instances to the local index.

use std::sync::Weak;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheIndex;
use crate::sync::StorageEvent;

/// Spawns the listener for `index`.
///
/// The task exits when the index is dropped or the channel closes. Lagging
/// behind the channel drops the missed events with a warning; entries they
/// touched are corrected by the next lazy expiration check or change event.
///
/// # Example
/// ```ignore
/// let rx = bus.subscribe();
/// let handle = spawn_sync_listener(Arc::downgrade(&index), rx);
/// index.write().await.attach_listener(handle);
/// ```
pub fn spawn_sync_listener(
    index: Weak<RwLock<CacheIndex>>,
    mut rx: broadcast::Receiver<StorageEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting cross-context sync listener");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(index) = index.upgrade() else {
                        break;
                    };
                    debug!(key = %event.key, "Received storage event");
                    index.write().await.apply_remote_change(&event);
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Sync listener lagged, {} storage events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }

        debug!("Cross-context sync listener stopped");
    })
}
