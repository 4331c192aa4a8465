//! Bounded in-memory TTL cache.
//!
//! ## Eviction
//!
//! When an insert would exceed `max_entries`, expired entries are dropped
//! first. If none are expired, the entry inserted longest ago is evicted.

use std::collections::HashMap;
use std::hash::Hash;
use tokio::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Key → value cache with a per-entry time to live.
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert with the default TTL.
    pub fn insert(&mut self, key: K, value: V) {
        let ttl = self.default_ttl;
        self.insert_with_ttl(key, value, ttl);
    }

    pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_one();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Number of entries, including expired ones not yet cleaned up.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_one(&mut self) {
        if self.cleanup_expired() > 0 {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
