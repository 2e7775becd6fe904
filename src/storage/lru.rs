//! Bounded LRU Cache Store
//!
//! The cache keeps every entry in a doubly linked recency list, most recently
//! used at the head and least recently used at the tail. A hash index maps each
//! key to its node so lookups, promotions and removals are all O(1).
//!
//! ## Layout
//!
//! ```text
//!  index: HashMap<Bytes, usize>          slots: Vec<Node> (arena)
//!  ┌────────┬─────┐                      ┌──────┬──────┬──────┬──────┐
//!  │ "a"    │  2  │──────────────┐       │  0   │  1   │  2   │  3   │
//!  │ "b"    │  0  │───┐          │       │ "b"  │ free │ "a"  │ "c"  │
//!  │ "c"    │  3  │─┐ │          │       └──────┴──────┴──────┴──────┘
//!  └────────┴─────┘ │ │          │
//!                   │ │          ▼
//!           head ─> [3] <-> [0] <-> [2] <─ tail
//!                   MRU              LRU
//! ```
//!
//! Nodes link to each other by slot index. Freed slots go on a free list and
//! are reused by the next insertion, so the arena never grows past the
//! configured capacity.

use bytes::Bytes;
use std::collections::HashMap;
use std::mem;

use crate::storage::error::{StoreError, StoreResult};

/// Upper bound on the number of slots reserved up front.
const MAX_PREALLOCATED: usize = 1024;

#[derive(Debug, Default)]
struct Node {
    key: Bytes,
    value: Bytes,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A point-in-time snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
    /// hits / (hits + misses), or 0.0 before any lookup.
    pub hit_rate: f64,
}

/// A bounded key-value map that evicts the least recently used entry.
///
/// The cache is not synchronized; the storage engine wraps it in a mutex.
///
/// # Example
///
/// ```
/// use lrukv::storage::LruCache;
/// use bytes::Bytes;
///
/// let mut cache = LruCache::new(2).unwrap();
/// cache.put(Bytes::from("a"), Bytes::from("1")).unwrap();
/// cache.put(Bytes::from("b"), Bytes::from("2")).unwrap();
///
/// // Touch "a" so "b" becomes the eviction candidate.
/// assert_eq!(cache.get(b"a"), Some(Bytes::from("1")));
///
/// let evicted = cache.put(Bytes::from("c"), Bytes::from("3")).unwrap();
/// assert_eq!(evicted.map(|(k, _)| k), Some(Bytes::from("b")));
/// ```
#[derive(Debug)]
pub struct LruCache {
    index: HashMap<Bytes, usize>,
    slots: Vec<Node>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
    hits: u64,
    misses: u64,
    puts: u64,
    evictions: u64,
}

impl LruCache {
    /// Creates an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> StoreResult<Self> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity);
        }

        let reserved = capacity.min(MAX_PREALLOCATED);
        Ok(Self {
            index: HashMap::with_capacity(reserved),
            slots: Vec::with_capacity(reserved),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
            hits: 0,
            misses: 0,
            puts: 0,
            evictions: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts or overwrites `key` and makes it the most recently used entry.
    ///
    /// Overwriting never evicts. Inserting a new key into a full cache evicts
    /// the least recently used entry first and returns it.
    ///
    /// Memory for the new entry is reserved before anything is touched, so
    /// on `Err(StoreError::OutOfMemory)` the cache is exactly as it was.
    pub fn put(&mut self, key: Bytes, value: Bytes) -> StoreResult<Option<(Bytes, Bytes)>> {
        if let Some(&idx) = self.index.get(&key) {
            self.slots[idx].value = value;
            self.move_to_front(idx);
            self.puts += 1;
            return Ok(None);
        }

        self.index
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory)?;
        if self.free.is_empty() {
            self.slots
                .try_reserve(1)
                .map_err(|_| StoreError::OutOfMemory)?;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_lru()
        } else {
            None
        };

        let idx = self.alloc(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_front(idx);
        self.index.insert(key, idx);
        self.puts += 1;

        Ok(evicted)
    }

    /// Returns the value for `key` and promotes it to most recently used.
    ///
    /// Counts a hit or a miss.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        match self.index.get(key).copied() {
            Some(idx) => {
                self.move_to_front(idx);
                self.hits += 1;
                Some(self.slots[idx].value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Returns the value for `key` without promoting it or counting a lookup.
    pub fn peek(&self, key: &[u8]) -> Option<&Bytes> {
        self.index.get(key).map(|&idx| &self.slots[idx].value)
    }

    /// Pure membership test; recency order is left alone.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &[u8]) -> Option<Bytes> {
        let idx = self.index.remove(key)?;
        let (_, value) = self.release(idx);
        Some(value)
    }

    /// Removes every entry. Cumulative counters are kept.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Changes the capacity, evicting from the tail until the cache fits.
    ///
    /// Returns the evicted entries, least recently used first.
    pub fn set_capacity(&mut self, capacity: usize) -> StoreResult<Vec<(Bytes, Bytes)>> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity);
        }

        self.capacity = capacity;
        let mut evicted = Vec::new();
        while self.index.len() > self.capacity {
            match self.evict_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        Ok(evicted)
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.puts = 0;
        self.evictions = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        };

        CacheStats {
            hits: self.hits,
            misses: self.misses,
            puts: self.puts,
            evictions: self.evictions,
            size: self.index.len(),
            capacity: self.capacity,
            hit_rate,
        }
    }

    /// Keys in recency order, most recently used first.
    pub fn keys(&self) -> Vec<Bytes> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            keys.push(self.slots[idx].key.clone());
            cursor = self.slots[idx].next;
        }
        keys
    }

    // ------------------------------------------------------------------
    // Recency list plumbing
    // ------------------------------------------------------------------

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = node;
                idx
            }
            None => {
                self.slots.push(node);
                self.slots.len() - 1
            }
        }
    }

    /// Unlinks a slot and puts it on the free list. The caller owns the
    /// index entry.
    fn release(&mut self, idx: usize) -> (Bytes, Bytes) {
        self.unlink(idx);
        let node = mem::take(&mut self.slots[idx]);
        self.free.push(idx);
        (node.key, node.value)
    }

    fn evict_lru(&mut self) -> Option<(Bytes, Bytes)> {
        let idx = self.tail?;
        let (key, value) = self.release(idx);
        self.index.remove(&key);
        self.evictions += 1;
        Some((key, value))
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }

        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;

        match self.head {
            Some(h) => self.slots[h].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8),
        Get(u8),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0u8..16).prop_map(Op::Put),
            2 => (0u8..16).prop_map(Op::Get),
            1 => (0u8..16).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn size_never_exceeds_capacity(
            capacity in 1usize..8,
            keys in prop::collection::vec(any::<u16>(), 0..200),
        ) {
            let mut cache = LruCache::new(capacity).unwrap();
            for key in keys {
                cache.put(Bytes::from(key.to_string()), Bytes::from_static(b"v")).unwrap();
                prop_assert!(cache.len() <= capacity);
            }
        }

        #[test]
        fn matches_reference_model(
            capacity in 1usize..6,
            ops in prop::collection::vec(op_strategy(), 0..150),
        ) {
            let mut cache = LruCache::new(capacity).unwrap();
            // Most recently used first.
            let mut model: Vec<u8> = Vec::new();

            for op in ops {
                match op {
                    Op::Put(k) => {
                        let key = Bytes::from(vec![k]);
                        let evicted = cache.put(key, Bytes::from(vec![k])).unwrap();
                        if let Some(pos) = model.iter().position(|&m| m == k) {
                            model.remove(pos);
                            prop_assert!(evicted.is_none());
                        } else if model.len() == capacity {
                            let lru = model.pop();
                            prop_assert_eq!(evicted.map(|(ek, _)| ek[0]), lru);
                        } else {
                            prop_assert!(evicted.is_none());
                        }
                        model.insert(0, k);
                    }
                    Op::Get(k) => {
                        let got = cache.get(&[k]);
                        if let Some(pos) = model.iter().position(|&m| m == k) {
                            model.remove(pos);
                            model.insert(0, k);
                            prop_assert_eq!(got, Some(Bytes::from(vec![k])));
                        } else {
                            prop_assert!(got.is_none());
                        }
                    }
                    Op::Remove(k) => {
                        let removed = cache.remove(&[k]);
                        let pos = model.iter().position(|&m| m == k);
                        prop_assert_eq!(removed.is_some(), pos.is_some());
                        if let Some(pos) = pos {
                            model.remove(pos);
                        }
                    }
                }

                let keys: Vec<u8> = cache.keys().iter().map(|k| k[0]).collect();
                prop_assert_eq!(keys, model.clone());
            }
        }
    }
}
