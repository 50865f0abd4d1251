//! TTL cache with insertion-order eviction.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Keyed cache whose entries expire `ttl` after insertion.
///
/// When full, inserting a new key evicts the single entry with the oldest
/// insertion time. Reads never refresh an entry.
pub struct TtlCache<V> {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    /// A zero `capacity` is treated as one.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`; an expired entry is evicted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.inserted_at.elapsed() >= self.ttl {
                entries.remove(key);
                debug!(key = key, "Cache entry expired");
            }
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut entries = self.entries.write();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(key = %oldest, "Evicted oldest cache entry");
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Split `keys` into fresh hits and misses, preserving miss order.
    pub fn get_many<'a, I>(&self, keys: I) -> (HashMap<String, V>, Vec<String>)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut hits = HashMap::new();
        let mut misses = Vec::new();
        for key in keys {
            match self.get(key) {
                Some(value) => {
                    hits.insert(key.clone(), value);
                }
                None => misses.push(key.clone()),
            }
        }
        (hits, misses)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.write().remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<V> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("len", &self.entries.read().len())
            .finish()
    }
}
