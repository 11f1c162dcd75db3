//! Background Tasks Module
//!
//! Tasks that run alongside the cache.
//!
//! # Tasks
//! - Expiry timers: evict one entry when its lifetime runs out
//! - Sync listener: applies changes published by other contexts

mod expiry;
mod sync_listener;

pub use expiry::ExpiryScheduler;
pub use sync_listener::spawn_sync_listener;
