//! Storage Engine
//!
//! Combines the [`LruCache`] and the [`ExpirationIndex`] behind a single lock
//! and exposes the operations the command layer needs.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                StorageEngine                  │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │        parking_lot::Mutex<State>        │  │
//! │  │  ┌────────────┐  ┌──────────────────┐   │  │
//! │  │  │  LruCache  │  │ ExpirationIndex  │   │  │
//! │  │  └────────────┘  └──────────────────┘   │  │
//! │  │           expired_keys: u64             │  │
//! │  └─────────────────────────────────────────┘  │
//! │  clock: Arc<dyn Clock>                        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Every public method takes the lock exactly once, so each command is atomic
//! with respect to every other command.
//!
//! ## Expiry
//!
//! Expired keys are removed lazily by every key lookup and actively by
//! [`StorageEngine::sweep_expired`], which the server calls once per second.
//! Both paths go through the same bookkeeping: the key leaves the cache and the
//! index, and the expired-key counter goes up if a cache entry was removed.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use crate::storage::clock::{Clock, SystemClock};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::expiry::ExpirationIndex;
use crate::storage::lru::{CacheStats, LruCache};

/// Longest key accepted, in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Largest value accepted, in bytes.
pub const MAX_VALUE_LEN: usize = 1024 * 1024;

/// Result of a TTL lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// The key does not exist (or just expired).
    Missing,
    /// The key exists and never expires.
    Persistent,
    /// Whole seconds left, rounded up. Always at least 1.
    Remaining(u64),
}

impl TtlStatus {
    /// The integer a TTL command reports: -2, -1, or the seconds left.
    pub fn as_integer(self) -> i64 {
        match self {
            TtlStatus::Missing => -2,
            TtlStatus::Persistent => -1,
            TtlStatus::Remaining(secs) => i64::try_from(secs).unwrap_or(i64::MAX),
        }
    }
}

/// Snapshot of engine statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StorageStats {
    pub cache: CacheStats,
    /// Keys that currently carry a deadline.
    pub expiring_keys: usize,
    /// Keys removed because their deadline passed.
    pub expired_keys: u64,
}

#[derive(Debug)]
struct EngineState {
    cache: LruCache,
    expiry: ExpirationIndex,
    expired_keys: u64,
}

impl EngineState {
    /// Removes `key` if its deadline has passed. Returns true if it did.
    fn expire_if_due(&mut self, key: &[u8], now_ms: u64) -> bool {
        if !self.expiry.is_expired(key, now_ms) {
            return false;
        }

        self.expiry.remove(key);
        if self.cache.remove(key).is_some() {
            self.expired_keys += 1;
            trace!(key = %String::from_utf8_lossy(key), "Key expired");
        }
        true
    }

    fn forget_evicted(&mut self, evicted: Option<(Bytes, Bytes)>) {
        if let Some((key, _)) = evicted {
            trace!(key = %String::from_utf8_lossy(&key), "Evicted least recently used key");
            self.expiry.remove(&key);
        }
    }
}

/// The thread-safe cache shared by all connections.
#[derive(Debug)]
pub struct StorageEngine {
    state: Mutex<EngineState>,
    clock: Arc<dyn Clock>,
}

impl StorageEngine {
    /// Creates an engine that holds at most `capacity` keys, using the system
    /// clock.
    pub fn new(capacity: usize) -> StoreResult<Self> {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Creates an engine that reads time from `clock`.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Ok(Self {
            state: Mutex::new(EngineState {
                cache: LruCache::new(capacity)?,
                expiry: ExpirationIndex::new(),
                expired_keys: 0,
            }),
            clock,
        })
    }

    fn validate_key(key: &[u8]) -> StoreResult<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(StoreError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        Ok(())
    }

    fn validate_value(value: &[u8]) -> StoreResult<()> {
        if value.len() > MAX_VALUE_LEN {
            return Err(StoreError::ValueTooLarge {
                len: value.len(),
                max: MAX_VALUE_LEN,
            });
        }
        Ok(())
    }

    /// Stores `value` under `key`.
    ///
    /// With `Some(ttl_secs)` (non-zero) the key expires after that many
    /// seconds; with `None` any previous expiry is cleared. May evict the least
    /// recently used key.
    pub fn set(&self, key: Bytes, value: Bytes, ttl_secs: Option<u64>) -> StoreResult<()> {
        Self::validate_key(&key)?;
        Self::validate_value(&value)?;

        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        match ttl_secs.filter(|&secs| secs > 0) {
            Some(secs) => {
                // Reserve first so a failure leaves both structures untouched.
                state.expiry.reserve()?;
                let evicted = state.cache.put(key.clone(), value)?;
                state.forget_evicted(evicted);
                state.expiry.set_expiry(&key, secs, now)?;
            }
            None => {
                let evicted = state.cache.put(key.clone(), value)?;
                state.forget_evicted(evicted);
                state.expiry.remove(&key);
            }
        }
        Ok(())
    }

    /// Returns the value for `key`, or `None` if it is absent or expired.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        state.expire_if_due(key, now);
        state.cache.get(key)
    }

    /// Deletes `key`. Returns true if a live key was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        state.expire_if_due(key, now);
        state.expiry.remove(key);
        state.cache.remove(key).is_some()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        state.expire_if_due(key, now);
        state.cache.contains(key)
    }

    /// Gives an existing key a deadline `ttl_secs` from now.
    ///
    /// Returns `Ok(false)` if the key does not exist. A TTL of zero clears the
    /// deadline.
    pub fn expire(&self, key: &Bytes, ttl_secs: u64) -> StoreResult<bool> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        state.expire_if_due(key, now);
        if !state.cache.contains(key) {
            return Ok(false);
        }
        state.expiry.set_expiry(key, ttl_secs, now)?;
        Ok(true)
    }

    pub fn ttl(&self, key: &[u8]) -> TtlStatus {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        state.expire_if_due(key, now);
        if !state.cache.contains(key) {
            return TtlStatus::Missing;
        }

        match state.expiry.remaining(key, now) {
            None => TtlStatus::Persistent,
            Some(ms) => TtlStatus::Remaining(ms.div_ceil(1000).max(1)),
        }
    }

    /// Adds `delta` to the integer stored at `key` and returns the new value.
    ///
    /// A missing key counts as 0 and is created without an expiry. An existing
    /// key keeps its expiry.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> StoreResult<i64> {
        Self::validate_key(key)?;

        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        state.expire_if_due(key, now);
        let existing = state.cache.get(key);
        let current = match &existing {
            Some(value) => std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(StoreError::NotAnInteger)?,
            None => 0,
        };

        let updated = current.checked_add(delta).ok_or(StoreError::Overflow)?;

        let evicted = state
            .cache
            .put(key.clone(), Bytes::from(updated.to_string()))?;
        state.forget_evicted(evicted);
        if existing.is_none() {
            state.expiry.remove(key);
        }

        Ok(updated)
    }

    pub fn incr(&self, key: &Bytes) -> StoreResult<i64> {
        self.incr_by(key, 1)
    }

    pub fn decr(&self, key: &Bytes) -> StoreResult<i64> {
        self.incr_by(key, -1)
    }

    /// Removes every key and every deadline.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        state.cache.clear();
        state.expiry.clear();
    }

    /// Number of keys currently in the cache, including expired keys that
    /// have not been reclaimed yet.
    pub fn len(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().cache.capacity()
    }

    /// Removes every key whose deadline has passed.
    ///
    /// Returns the number of cache entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        let mut removed = 0;
        for key in state.expiry.sweep(now) {
            if state.cache.remove(&key).is_some() {
                removed += 1;
            }
        }
        state.expired_keys += removed as u64;
        removed
    }

    /// Changes the capacity. Returns how many keys were evicted to fit.
    pub fn set_capacity(&self, capacity: usize) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let evicted = state.cache.set_capacity(capacity)?;
        for (key, _) in &evicted {
            state.expiry.remove(key);
        }
        Ok(evicted.len())
    }

    /// Zeroes the cache hit/miss/put/eviction counters.
    pub fn reset_stats(&self) {
        self.state.lock().cache.reset_stats();
    }

    pub fn stats(&self) -> StorageStats {
        let state = self.state.lock();
        StorageStats {
            cache: state.cache.stats(),
            expiring_keys: state.expiry.len(),
            expired_keys: state.expired_keys,
        }
    }
}
