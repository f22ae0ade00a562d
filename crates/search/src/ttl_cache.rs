//! Bounded TTL cache
//!
//! An insertion-ordered map with per-entry expiry and oldest-first batch
//! eviction. All operations take one lock, so readers never observe a
//! half-applied eviction. Read order is not tracked (no LRU-on-read).

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    /// Monotone insertion counter, used for oldest-first eviction
    sequence: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    next_sequence: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded TTL cache keyed by `K`
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    max_entries: usize,
    eviction_batch: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize, eviction_batch: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_sequence: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            ttl,
            max_entries: max_entries.max(1),
            eviction_batch: eviction_batch.max(1),
        }
    }

    /// Get a live value; expired entries are removed on the way
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.entries.remove(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Batch get; the returned map holds only live entries
    pub fn get_many(&self, keys: &[K]) -> HashMap<K, V> {
        let mut inner = self.inner.lock();
        let mut found = HashMap::new();
        for key in keys {
            match inner.entries.get(key) {
                Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                    found.insert(key.clone(), entry.value.clone());
                }
                Some(_) => {
                    inner.entries.remove(key);
                }
                None => {}
            }
        }
        inner.hits += found.len() as u64;
        inner.misses += (keys.len() - found.len()) as u64;
        found
    }

    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        self.insert_locked(&mut inner, key, value);
    }

    /// Batch set under one lock acquisition
    pub fn set_many(&self, pairs: impl IntoIterator<Item = (K, V)>) {
        let mut inner = self.inner.lock();
        for (key, value) in pairs {
            self.insert_locked(&mut inner, key, value);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_locked(&self, inner: &mut Inner<K, V>, key: K, value: V) {
        // Overwrites do not grow the map, so they never trigger eviction
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            self.evict_oldest_locked(inner);
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                sequence,
            },
        );
    }

    fn evict_oldest_locked(&self, inner: &mut Inner<K, V>) {
        let mut by_age: Vec<(u64, K)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (entry.sequence, key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(sequence, _)| *sequence);

        for (_, key) in by_age.into_iter().take(self.eviction_batch) {
            inner.entries.remove(&key);
            inner.evictions += 1;
        }
    }
}
