//! Cache Snapshot Module
//!
//! The serializable projection of an entry written to the durable store and
//! carried in cross-context change events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EntryConfig;
use crate::error::Result;

/// Durable form of a [`CacheEntry`](crate::cache::CacheEntry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub key: String,
    pub value: Value,
    pub configuration: EntryConfig,
    /// Unix milliseconds, `None` = never expires
    pub expires_at: Option<i64>,
    /// Unix milliseconds of the last write
    pub last_update: i64,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
