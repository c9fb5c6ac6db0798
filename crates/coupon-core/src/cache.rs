//! Bounded LRU cache of validation decisions
//!
//! Entries live in a slab of nodes linked by index into a doubly-linked
//! recency list: `head` is the most recently used entry, `tail` the least.
//! Promote, insert and evict are all O(1). One mutex guards the whole
//! structure, which makes this cache the main serialization point on the
//! request path.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of cached decisions
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Hit/miss accounting for the result cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// New keys inserted
    pub insertions: u64,
    /// Entries evicted to stay within capacity
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
}

impl CacheStats {
    /// Ratio of hits to lookups; 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Node {
    key: String,
    value: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct LruState {
    capacity: usize,
    slots: HashMap<String, usize>,
    nodes: Vec<Node>,
    head: Option<usize>,
    tail: Option<usize>,
    stats: CacheStats,
}

impl LruState {
    fn new(capacity: usize) -> Self {
        let reserve = capacity.min(DEFAULT_CACHE_CAPACITY);
        Self {
            capacity,
            slots: HashMap::with_capacity(reserve),
            nodes: Vec::with_capacity(reserve),
            head: None,
            tail: None,
            stats: CacheStats::default(),
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn get(&mut self, key: &str) -> Option<bool> {
        match self.slots.get(key).copied() {
            Some(idx) => {
                self.promote(idx);
                self.stats.hits += 1;
                Some(self.nodes[idx].value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn set(&mut self, key: String, value: bool) {
        if let Some(idx) = self.slots.get(&key).copied() {
            self.nodes[idx].value = value;
            self.promote(idx);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        self.stats.insertions += 1;

        // At capacity the new key takes over the evicted tail's slot.
        let idx = if self.slots.len() >= self.capacity {
            let Some(lru) = self.tail else {
                return;
            };
            self.unlink(lru);
            let evicted = std::mem::replace(&mut self.nodes[lru].key, key.clone());
            self.slots.remove(&evicted);
            self.stats.evictions += 1;
            debug!(key = %evicted, "evicted least recently used decision");
            self.nodes[lru].value = value;
            lru
        } else {
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.nodes.len() - 1
        };
        self.slots.insert(key, idx);
        self.push_front(idx);
    }

    fn keys_by_recency(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.slots.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            keys.push(self.nodes[idx].key.clone());
            cursor = self.nodes[idx].next;
        }
        keys
    }
}

/// Fixed-capacity LRU map from normalized code to validity decision.
#[derive(Debug)]
pub struct ResultCache {
    state: Mutex<LruState>,
}

impl ResultCache {
    /// Create a cache holding at most `capacity` decisions.
    ///
    /// A zero capacity cache stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::new(capacity)),
        }
    }

    /// Cached decision for `key`, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.state.lock().get(key)
    }

    /// Insert or update `key`, making it most recently used.
    ///
    /// Inserting a new key into a full cache evicts exactly one entry, the
    /// least recently used.
    pub fn set(&self, key: impl Into<String>, value: bool) {
        self.state.lock().set(key.into(), value)
    }

    /// True if `key` is cached. Does not affect recency or stats.
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().slots.contains_key(key)
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Keys ordered from most to least recently used
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.state.lock().keys_by_recency()
    }

    /// Snapshot of hit/miss counters
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.slots.len(),
            ..state.stats.clone()
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
