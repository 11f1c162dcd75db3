//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror. Lookup misses are not
//! errors; they are `None`. Persistence faults are carried by [`StorageError`]
//! and normally swallowed at the storage boundary.

use thiserror::Error;

// == Storage Error Enum ==
/// Failure reported by a durable key-value store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage is disabled or otherwise not reachable
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Writing the item would exceed the store capacity
    #[error("Storage quota exceeded: {needed} bytes needed, {available} bytes available")]
    QuotaExceeded { needed: usize, available: usize },

    /// A stored item could not be decoded
    #[error("Corrupt item under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Underlying I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key rejected before touching the cache (empty or too long)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Durable store failure that was not absorbed at the boundary
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Snapshot (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_message() {
        let err = StorageError::QuotaExceeded {
            needed: 120,
            available: 64,
        };
        assert_eq!(
            err.to_string(),
            "Storage quota exceeded: 120 bytes needed, 64 bytes available"
        );
    }

    #[test]
    fn test_storage_error_is_transparent_in_cache_error() {
        let err: CacheError = StorageError::Unavailable("disabled".to_string()).into();
        assert_eq!(err.to_string(), "Storage unavailable: disabled");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: CacheError = parse.unwrap_err().into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
