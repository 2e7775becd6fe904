//! Expiration Index
//!
//! A side table mapping keys to absolute expiry deadlines (milliseconds since
//! the Unix epoch). Keys without an entry never expire.
//!
//! The index is deliberately loose about membership: an entry may outlive the
//! cache entry it refers to (for example after an LRU eviction). Such stale
//! entries are harmless and are reconciled by the next lookup or sweep.

use bytes::Bytes;
use std::collections::HashMap;

use crate::storage::error::{StoreError, StoreResult};

/// Initial number of slots reserved for deadlines.
pub const INITIAL_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct ExpirationIndex {
    deadlines: HashMap<Bytes, u64>,
}

impl Default for ExpirationIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpirationIndex {
    pub fn new() -> Self {
        Self {
            deadlines: HashMap::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Sets the deadline for `key` to `now_ms + ttl_secs` seconds.
    ///
    /// A TTL of zero clears any existing expiry. On `OutOfMemory` the index
    /// is unchanged.
    pub fn set_expiry(&mut self, key: &Bytes, ttl_secs: u64, now_ms: u64) -> StoreResult<()> {
        if ttl_secs == 0 {
            self.deadlines.remove(key);
            return Ok(());
        }
        let deadline = now_ms.saturating_add(ttl_secs.saturating_mul(1000));
        self.set_deadline(key, deadline)
    }

    /// Stores an absolute deadline for `key`, replacing any previous one.
    pub fn set_deadline(&mut self, key: &Bytes, deadline_ms: u64) -> StoreResult<()> {
        if let Some(existing) = self.deadlines.get_mut(key) {
            *existing = deadline_ms;
            return Ok(());
        }

        self.deadlines
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory)?;
        self.deadlines.insert(key.clone(), deadline_ms);
        Ok(())
    }

    /// Reserves room for one more deadline so a following `set_deadline`
    /// cannot fail.
    pub fn reserve(&mut self) -> StoreResult<()> {
        self.deadlines
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory)
    }

    /// Drops the deadline for `key`. Returns true if one existed.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.deadlines.remove(key).is_some()
    }

    pub fn deadline(&self, key: &[u8]) -> Option<u64> {
        self.deadlines.get(key).copied()
    }

    /// True if `key` has a deadline and it has been reached.
    #[inline]
    pub fn is_expired(&self, key: &[u8], now_ms: u64) -> bool {
        self.deadlines
            .get(key)
            .is_some_and(|&deadline| now_ms >= deadline)
    }

    /// Milliseconds left before `key` expires, or `None` if it has no deadline.
    pub fn remaining(&self, key: &[u8], now_ms: u64) -> Option<u64> {
        self.deadlines
            .get(key)
            .map(|&deadline| deadline.saturating_sub(now_ms))
    }

    /// Removes every deadline that has been reached and returns the keys.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<Bytes> {
        let expired: Vec<Bytes> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| now_ms >= deadline)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.deadlines.remove(key);
        }
        expired
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
