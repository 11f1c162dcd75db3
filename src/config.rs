//! Configuration Module
//!
//! Index-wide defaults ([`CacheConfig`]), call-site overrides ([`CacheOptions`])
//! and the per-entry configuration they resolve to ([`EntryConfig`]).

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default durable-store key prefix.
pub const DEFAULT_PREFIX: &str = "ngxLiquidCache_";

// == Object Kind ==
/// How the cached value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    /// Value is produced lazily by a fetch and replayed once resolved
    Observable,
    /// Value is supplied directly by the caller
    #[default]
    Static,
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observable" | "0" => Ok(ObjectKind::Observable),
            "static" | "1" => Ok(ObjectKind::Static),
            other => Err(format!("unknown object kind '{}'", other)),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Observable => write!(f, "observable"),
            ObjectKind::Static => write!(f, "static"),
        }
    }
}

// == Storage Kind ==
/// Where an entry lives besides process memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageKind {
    /// Lost when the process exits
    #[default]
    InMemory,
    /// Snapshot written to the durable store under `prefix + key`
    #[serde(alias = "localStorage")]
    Persistent,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inmemory" | "in-memory" | "memory" => Ok(StorageKind::InMemory),
            "persistent" | "localstorage" => Ok(StorageKind::Persistent),
            other => Err(format!("unknown storage kind '{}'", other)),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::InMemory => write!(f, "inMemory"),
            StorageKind::Persistent => write!(f, "persistent"),
        }
    }
}

// == Cache Config ==
/// Index-wide configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix prepended to every key in the durable store
    pub local_storage_prefix: String,
    /// Default lifetime in seconds, `None` = never expires
    pub duration: Option<u64>,
    /// Default object kind
    pub object_kind: ObjectKind,
    /// Default storage kind
    pub storage_kind: StorageKind,
    /// Whether entries broadcast changes to other contexts by default
    pub share_across_contexts: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LIQUID_CACHE_PREFIX` - Durable key prefix (default: `ngxLiquidCache_`)
    /// - `LIQUID_CACHE_DURATION` - Default lifetime in seconds, 0 = never (default: none)
    /// - `LIQUID_CACHE_OBJECT_KIND` - `observable` or `static` (default: static)
    /// - `LIQUID_CACHE_STORAGE_KIND` - `inMemory` or `persistent` (default: inMemory)
    /// - `LIQUID_CACHE_SHARE_ACROSS_CONTEXTS` - `true`/`false` (default: false)
    ///
    /// Malformed values are logged and replaced by their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            local_storage_prefix: env::var("LIQUID_CACHE_PREFIX")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.local_storage_prefix),
            duration: env::var("LIQUID_CACHE_DURATION")
                .ok()
                .and_then(|v| match v.trim().parse::<i64>() {
                    Ok(secs) => CacheOptions::new().duration(secs).resolve_duration(None),
                    Err(_) => {
                        warn!("Ignoring malformed LIQUID_CACHE_DURATION '{}'", v);
                        None
                    }
                })
                .or(defaults.duration),
            object_kind: parse_env_or("LIQUID_CACHE_OBJECT_KIND", defaults.object_kind),
            storage_kind: parse_env_or("LIQUID_CACHE_STORAGE_KIND", defaults.storage_kind),
            share_across_contexts: parse_env_or(
                "LIQUID_CACHE_SHARE_ACROSS_CONTEXTS",
                defaults.share_across_contexts,
            ),
        }
    }

    /// Entry configuration used when a call site supplies no overrides.
    pub fn entry_defaults(&self) -> EntryConfig {
        EntryConfig {
            duration: self.duration,
            object_kind: self.object_kind,
            storage_kind: self.storage_kind,
            share_across_contexts: self.share_across_contexts,
        }
    }

    /// Durable-store key for a cache key.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.local_storage_prefix, key)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_storage_prefix: DEFAULT_PREFIX.to_string(),
            duration: None,
            object_kind: ObjectKind::Static,
            storage_kind: StorageKind::InMemory,
            share_across_contexts: false,
        }
    }
}

fn parse_env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", name, e);
                default
            }
        },
        Err(_) => default,
    }
}

// == Entry Config ==
/// Fully resolved configuration of a single entry, stored in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryConfig {
    /// Lifetime in seconds, `None` = never expires
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub object_kind: ObjectKind,
    #[serde(default)]
    pub storage_kind: StorageKind,
    #[serde(default)]
    pub share_across_contexts: bool,
}

impl EntryConfig {
    pub fn is_persistent(&self) -> bool {
        self.storage_kind == StorageKind::Persistent
    }
}

// == Cache Options ==
/// Call-site overrides. Absent fields fall back to the index defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    /// Lifetime in seconds; `0` means never expires, negative is rejected
    pub duration: Option<i64>,
    pub object_kind: Option<ObjectKind>,
    pub storage_kind: Option<StorageKind>,
    pub share_across_contexts: Option<bool>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(mut self, seconds: i64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn object_kind(mut self, kind: ObjectKind) -> Self {
        self.object_kind = Some(kind);
        self
    }

    pub fn storage_kind(mut self, kind: StorageKind) -> Self {
        self.storage_kind = Some(kind);
        self
    }

    pub fn persistent(self) -> Self {
        self.storage_kind(StorageKind::Persistent)
    }

    pub fn share_across_contexts(mut self, share: bool) -> Self {
        self.share_across_contexts = Some(share);
        self
    }

    // == Resolve ==
    /// Merges these overrides onto `defaults`. Never fails.
    pub fn resolve(&self, defaults: &EntryConfig) -> EntryConfig {
        EntryConfig {
            duration: self.resolve_duration(defaults.duration),
            object_kind: self.object_kind.unwrap_or(defaults.object_kind),
            storage_kind: self.storage_kind.unwrap_or(defaults.storage_kind),
            share_across_contexts: self
                .share_across_contexts
                .unwrap_or(defaults.share_across_contexts),
        }
    }

    fn resolve_duration(&self, default: Option<u64>) -> Option<u64> {
        match self.duration {
            None => default,
            Some(0) => None,
            Some(secs) if secs > 0 => Some(secs as u64),
            Some(secs) => {
                warn!("Rejecting negative duration {}s, using default", secs);
                default
            }
        }
    }
}
