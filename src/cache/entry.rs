//! Cache Entry Module
//!
//! One entry per key. The entry owns its expiration timestamp and the single
//! timer that evicts it; the index owns the map the entry lives in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::Snapshot;
use crate::config::{EntryConfig, ObjectKind};
use crate::tasks::ExpiryScheduler;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

// == Cached Value ==
/// Payload of an entry, tagged by how it was produced.
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// Supplied directly by the caller
    Static(Value),
    /// Produced once by a fetch and replayed to every later caller
    Observable(Arc<OnceCell<Value>>),
}

impl CachedValue {
    /// An observable slot waiting for its first value.
    pub fn pending() -> Self {
        CachedValue::Observable(Arc::new(OnceCell::new()))
    }

    /// An observable slot that already holds `value`.
    pub fn replay(value: Value) -> Self {
        CachedValue::Observable(Arc::new(OnceCell::new_with(Some(value))))
    }

    /// Wraps `value` according to `kind`.
    pub fn for_kind(kind: ObjectKind, value: Value) -> Self {
        match kind {
            ObjectKind::Observable => Self::replay(value),
            ObjectKind::Static => CachedValue::Static(value),
        }
    }

    /// The value if it is available, `None` while an observable is unresolved.
    pub fn resolved(&self) -> Option<Value> {
        match self {
            CachedValue::Static(value) => Some(value.clone()),
            CachedValue::Observable(cell) => cell.get().cloned(),
        }
    }

    pub fn slot(&self) -> Option<&Arc<OnceCell<Value>>> {
        match self {
            CachedValue::Observable(cell) => Some(cell),
            CachedValue::Static(_) => None,
        }
    }
}

// == Expiration ==
/// Outcome of [`CacheEntry::check_expiration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// The entry has no lifetime
    Never,
    /// A timer is armed for the given delay
    Armed(Duration),
    /// The deadline has passed; the entry must be removed
    Expired,
}

// == Cache Entry ==
/// A single cached value with its configuration and expiration state.
#[derive(Debug)]
pub struct CacheEntry {
    key: String,
    value: CachedValue,
    config: EntryConfig,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    expires_at: Option<i64>,
    /// Last write timestamp (Unix milliseconds)
    last_update: i64,
    timer: Option<JoinHandle<()>>,
    timer_id: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry and immediately runs the initial [`update`](Self::update).
    pub fn new(
        key: impl Into<String>,
        value: CachedValue,
        config: EntryConfig,
        scheduler: &ExpiryScheduler,
    ) -> Self {
        let mut entry = Self {
            key: key.into(),
            value: CachedValue::Static(Value::Null),
            config,
            expires_at: None,
            last_update: 0,
            timer: None,
            timer_id: None,
        };
        entry.update(value, config, scheduler);
        entry
    }

    /// Rebuilds an entry from durable state without arming a timer.
    ///
    /// Callers follow up with [`check_expiration`](Self::check_expiration)
    /// passing `snapshot.expires_at`.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let value = match (snapshot.configuration.object_kind, snapshot.value) {
            (ObjectKind::Observable, Value::Null) => CachedValue::pending(),
            (kind, value) => CachedValue::for_kind(kind, value),
        };

        Self {
            key: snapshot.key,
            value,
            config: snapshot.configuration,
            expires_at: snapshot.expires_at,
            last_update: snapshot.last_update,
            timer: None,
            timer_id: None,
        }
    }

    // == Update ==
    /// Replaces value and configuration and restarts the expiration window.
    pub fn update(&mut self, value: CachedValue, config: EntryConfig, scheduler: &ExpiryScheduler) {
        self.value = value;
        self.config = config;
        self.last_update = current_timestamp_ms();
        self.expires_at = None;
        self.calculate_expiration(scheduler);
    }

    fn calculate_expiration(&mut self, scheduler: &ExpiryScheduler) {
        match self.config.duration {
            Some(secs) if self.expires_at.is_none() => {
                let deadline = secs
                    .checked_mul(1000)
                    .and_then(|ms| i64::try_from(ms).ok())
                    .and_then(|ms| self.last_update.checked_add(ms));
                match deadline {
                    Some(expires_at) => {
                        self.expires_at = Some(expires_at);
                        self.arm(Duration::from_secs(secs), scheduler);
                    }
                    None => {
                        warn!(
                            key = %self.key,
                            duration_secs = secs,
                            "Duration out of range, entry will not expire"
                        );
                        self.cancel_timer();
                    }
                }
            }
            Some(_) => {}
            None => self.cancel_timer(),
        }
    }

    // == Check Expiration ==
    /// Reconciles the timer with `expires_at`, adopting `override_expires_at`
    /// first when given.
    ///
    /// The remaining lifetime is rounded to the nearest whole second.
    pub fn check_expiration(
        &mut self,
        override_expires_at: Option<i64>,
        scheduler: &ExpiryScheduler,
    ) -> Expiration {
        if override_expires_at.is_some() {
            self.expires_at = override_expires_at;
        }

        let Some(expires_at) = self.expires_at else {
            return Expiration::Never;
        };

        let now = current_timestamp_ms();
        if expires_at <= now {
            self.cancel_timer();
            return Expiration::Expired;
        }

        let remaining_ms = (expires_at - now) as u64;
        let delay = Duration::from_secs((remaining_ms + 500) / 1000);
        self.arm(delay, scheduler);
        Expiration::Armed(delay)
    }

    // == Timer ==
    fn arm(&mut self, delay: Duration, scheduler: &ExpiryScheduler) {
        self.cancel_timer();

        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        debug!(key = %self.key, delay_secs = delay.as_secs(), "Arming expiry timer");
        self.timer = scheduler.schedule(self.key.clone(), id, delay);
        self.timer_id = Some(id);
    }

    /// Cancels the pending timer, if any. Safe to call repeatedly.
    pub fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        self.timer_id = None;
    }

    /// Whether a fired timer with `id` is still the current one.
    pub fn is_current_timer(&self, id: u64) -> bool {
        self.timer_id == Some(id)
    }

    pub fn has_timer(&self) -> bool {
        self.timer_id.is_some()
    }

    // == Accessors ==
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &CachedValue {
        &self.value
    }

    pub fn config(&self) -> &EntryConfig {
        &self.config
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    pub fn is_kind(&self, kind: ObjectKind) -> bool {
        self.config.object_kind == kind
    }

    // == Snapshot ==
    /// Serializable projection of the entry, without the timer.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            key: self.key.clone(),
            value: self.value.resolved().unwrap_or(Value::Null),
            configuration: self.config,
            expires_at: self.expires_at,
            last_update: self.last_update,
        }
    }

    // == Time To Live ==
    /// Returns remaining lifetime in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has a deadline in the future
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let now = current_timestamp_ms();
            if expires > now {
                (expires - now) as u64
            } else {
                0
            }
        })
    }

    /// Returns remaining lifetime in whole seconds, or None if no expiration is set.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.ttl_remaining_ms().map(|ms| ms / 1000)
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
