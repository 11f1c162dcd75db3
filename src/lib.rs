//! Liquid Cache - A client-side response cache
//!
//! Stores values by key with per-entry lifetimes, evicts them with per-entry
//! timers, optionally persists them to a durable store and keeps several
//! cache instances on the same store in sync.

pub mod cache;
pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod sync;
pub mod tasks;

pub use config::{CacheConfig, CacheOptions, ObjectKind, StorageKind};
pub use error::{CacheError, Result};
pub use service::{LiquidCache, LiquidCacheBuilder};
pub use storage::{FileStore, MemoryStore, PersistentStore};
pub use sync::SyncBus;
