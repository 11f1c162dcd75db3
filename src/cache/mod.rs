//! Cache Module
//!
//! Entry lifecycle engine and the index that owns the entries.

mod entry;
mod index;
mod snapshot;
mod stats;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, CachedValue, Expiration};
pub use index::{CacheIndex, Lookup};
pub use snapshot::Snapshot;
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
