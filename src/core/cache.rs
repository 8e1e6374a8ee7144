//! Name resolution cache
//!
//! Capacity-bounded LRU cache with a fixed 300 second TTL. Entries live in a
//! slot arena linked by `prev`/`next` indices (most recently used at `head`),
//! with a key to slot index for O(1) lookup, promotion and eviction. Freed
//! slots are reused through a free list.
//!
//! A fresh `get` refreshes the entry's timestamp, so a host that keeps being
//! queried inside the TTL never expires even though it was resolved once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ProxyError, Result};
use crate::logger::log;

/// Time after which an entry is logically expired
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Upper bound for the arena preallocation
const MAX_PREALLOC: usize = 1024;

const NIL: usize = usize::MAX;

struct Slot<V> {
    key: String,
    addresses: Vec<V>,
    refreshed: Instant,
    prev: usize,
    next: usize,
}

/// Cache counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expired;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of hostname to resolved addresses.
///
/// Not internally synchronised; [`SharedCache`] wraps it in a mutex.
pub struct ResolutionCache<V = IpAddr> {
    slots: Vec<Slot<V>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: usize,
    tail: usize,
    capacity: NonZeroUsize,
    ttl: Duration,
    stats: CacheStats,
}

impl<V> ResolutionCache<V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A zero capacity is a caller bug and fails immediately.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            ProxyError::InvalidArgument("cache capacity must be greater than zero".to_string())
        })?;
        Ok(Self::with_capacity(capacity))
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        let prealloc = capacity.get().min(MAX_PREALLOC);
        Self {
            slots: Vec::with_capacity(prealloc),
            free: Vec::new(),
            index: HashMap::with_capacity(prealloc),
            head: NIL,
            tail: NIL,
            capacity,
            ttl: CACHE_TTL,
            stats: CacheStats::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn max_size(&self) -> usize {
        self.capacity.get()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Look up `key` at the current time
    pub fn get(&mut self, key: &str) -> Option<(&[V], Instant)> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`.
    ///
    /// A fresh hit is promoted to most recently used and its timestamp set to
    /// `now`, which is the timestamp returned. An expired entry is removed.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<(&[V], Instant)> {
        let Some(&idx) = self.index.get(key) else {
            self.stats.misses += 1;
            log::trace!(host = key, "resolution cache miss");
            return None;
        };

        if now.saturating_duration_since(self.slots[idx].refreshed) >= self.ttl {
            self.stats.expired += 1;
            log::trace!(host = key, "resolution cache entry expired");
            self.remove_slot(idx);
            return None;
        }

        self.stats.hits += 1;
        self.promote(idx);
        let slot = &mut self.slots[idx];
        slot.refreshed = now;
        Some((slot.addresses.as_slice(), now))
    }

    /// Insert or replace `key` at the current time
    pub fn put(&mut self, key: &str, addresses: Vec<V>) {
        self.put_at(key, addresses, Instant::now())
    }

    /// Insert or replace `key` as of `now`.
    ///
    /// A new key on a full cache evicts the least recently used entry first.
    pub fn put_at(&mut self, key: &str, addresses: Vec<V>, now: Instant) {
        if let Some(&idx) = self.index.get(key) {
            let slot = &mut self.slots[idx];
            slot.addresses = addresses;
            slot.refreshed = now;
            self.promote(idx);
            return;
        }

        if self.index.len() >= self.capacity.get() {
            self.evict_lru();
        }

        let slot = Slot {
            key: key.to_string(),
            addresses,
            refreshed: now,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.push_front(idx);
        self.index.insert(key.to_string(), idx);
    }

    /// Remove `key`, returning its addresses
    pub fn remove(&mut self, key: &str) -> Option<Vec<V>> {
        let idx = *self.index.get(key)?;
        Some(self.remove_slot(idx))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let slot = &self.slots[cursor];
            cursor = slot.next;
            Some(slot.key.as_str())
        })
    }

    fn evict_lru(&mut self) {
        let idx = self.tail;
        if idx == NIL {
            return;
        }
        self.stats.evictions += 1;
        log::debug!(host = %self.slots[idx].key, "resolution cache eviction");
        self.remove_slot(idx);
    }

    fn remove_slot(&mut self, idx: usize) -> Vec<V> {
        self.unlink(idx);
        let slot = &mut self.slots[idx];
        let key = std::mem::take(&mut slot.key);
        let addresses = std::mem::take(&mut slot.addresses);
        self.index.remove(&key);
        self.free.push(idx);
        addresses
    }

    fn promote(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = &self.slots[idx];
            (slot.prev, slot.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
        let slot = &mut self.slots[idx];
        slot.prev = NIL;
        slot.next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[idx];
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            self.slots[old_head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

/// Mutex-guarded cache shared between tasks
pub struct SharedCache<V = IpAddr> {
    inner: Arc<Mutex<ResolutionCache<V>>>,
}

impl<V> Clone for SharedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> SharedCache<V> {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self::from_cache(ResolutionCache::new(capacity)?))
    }

    pub fn from_cache(cache: ResolutionCache<V>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    pub fn get(&self, key: &str) -> Option<(Vec<V>, Instant)> {
        self.inner
            .lock()
            .get(key)
            .map(|(addresses, refreshed)| (addresses.to_vec(), refreshed))
    }

    pub fn put(&self, key: &str, addresses: Vec<V>) {
        self.inner.lock().put(key, addresses);
    }

    pub fn remove(&self, key: &str) -> Option<Vec<V>> {
        self.inner.lock().remove(key)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().size()
    }

    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
