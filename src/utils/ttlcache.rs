//! Bounded, expire-after-write concurrent cache.
//!
//! [`TtlCache`] backs the structural view caches and the family verdict cache. It is a
//! hit-rate/memory trade-off, never a correctness requirement: every caller can rebuild a
//! missing value from scratch.
//!
//! # Concurrency
//!
//! The map is sharded ([`DashMap`]); lookups and inserts on different keys do not contend.
//! [`TtlCache::get_or_try_insert_with`] builds outside of any shard lock, so two workers
//! missing the same key may both build. The last insert wins and both callers get a valid
//! value. Concurrent inserts may briefly overshoot the capacity by the number of writers.
//!
//! # Eviction
//!
//! Every insert appends `(key, insert time)` to an insertion-order queue. A full cache pops
//! from the front of that queue until there is room, so eviction never scans the map. Queue
//! records whose entry has since been replaced or removed are skipped when popped, and the
//! queue is compacted once it holds twice the capacity.

use std::{
    collections::VecDeque,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::{config::CacheConfig, Result};

/// Counters describing how a cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found no live entry
    pub misses: u64,
    /// Entries dropped because they expired or the cache was full
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache, `0.0` when nothing was looked up.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted: Instant,
}

/// A concurrent map with a size bound and a per-entry time to live.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    order: Mutex<VecDeque<(K, Instant)>>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries, each for at most `ttl`.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        TtlCache {
            entries: DashMap::with_capacity(capacity.min(4096)),
            order: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a cache sized by `config`.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.ttl)
    }

    /// Returns the live value stored for `key`.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired
            && self
                .entries
                .remove_if(key, |_, entry| entry.inserted.elapsed() >= self.ttl)
                .is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// When the cache is full, the oldest entries are evicted. All entries share one time to
    /// live, so expired entries always go first. A cache with capacity `0` stores nothing.
    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.make_room();
        }

        let inserted = Instant::now();
        self.entries
            .insert(key.clone(), CacheEntry { value, inserted });

        let mut order = lock!(self.order);
        order.push_back((key, inserted));
        if order.len() > self.capacity.saturating_mul(2) {
            order.retain(|(key, inserted)| self.is_current(key, *inserted));
        }
    }

    /// Returns the live value for `key`, building and storing it with `build` on a miss.
    ///
    /// # Errors
    ///
    /// Returns the error of `build`; nothing is stored in that case.
    pub fn get_or_try_insert_with<F>(&self, key: K, build: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = build()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Removes the entry for `key`, returning its value if it was still live.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries
            .remove(key)
            .filter(|(_, entry)| entry.inserted.elapsed() < self.ttl)
            .map(|(_, entry)| entry.value)
    }

    /// Returns `true` if a live entry exists for `key`, without touching the statistics.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.inserted.elapsed() < self.ttl)
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry. Statistics are kept.
    pub fn clear(&self) {
        let mut order = lock!(self.order);
        self.entries.clear();
        order.clear();
    }

    /// Snapshot of the usage counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn make_room(&self) {
        let mut order = lock!(self.order);
        let mut evicted = 0;
        while self.entries.len() >= self.capacity {
            let Some((key, inserted)) = order.pop_front() else {
                break;
            };
            if self
                .entries
                .remove_if(&key, |_, entry| entry.inserted == inserted)
                .is_some()
            {
                evicted += 1;
            }
        }

        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    fn is_current(&self, key: &K, inserted: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.inserted == inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn get_and_insert() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::from_secs(60));
        assert_eq!(cache.get(&"a"), None);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 10);
        thread::sleep(Duration::from_millis(2));
        cache.insert(2, 20);
        thread::sleep(Duration::from_millis(2));
        cache.insert(3, 30);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.get(&3), Some(30));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert(2, 21);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&2), Some(21));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn refreshed_entries_are_evicted_by_age() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 10);
        thread::sleep(Duration::from_millis(2));
        cache.insert(2, 20);
        thread::sleep(Duration::from_millis(2));
        cache.insert(1, 11);
        thread::sleep(Duration::from_millis(2));
        cache.insert(3, 30);

        assert_eq!(cache.get(&1), Some(11));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some(30));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn eviction_order_stays_bounded() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, Duration::from_secs(60));
        for round in 0..100 {
            cache.insert(round % 3, round);
        }
        assert_eq!(cache.len(), 3);
        assert!(lock!(cache.order).len() <= 8);

        for key in 10..20 {
            cache.insert(key, key);
        }
        assert_eq!(cache.len(), 4);
        assert!(lock!(cache.order).len() <= 8);
        assert!((16..20).all(|key| cache.contains_key(&key)));
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache: TtlCache<u32, u32> = TtlCache::new(8, Duration::from_millis(10));
        cache.insert(1, 10);
        assert!(cache.contains_key(&1));
        thread::sleep(Duration::from_millis(25));
        assert!(!cache.contains_key(&1));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache: TtlCache<u32, u32> = TtlCache::from_config(&CacheConfig::disabled());
        cache.insert(1, 1);
        assert!(cache.is_empty());
        let value = cache.get_or_try_insert_with(1, || Ok(5)).unwrap();
        assert_eq!(value, 5);
        assert!(cache.is_empty());
    }

    #[test]
    fn failed_build_stores_nothing() {
        let cache: TtlCache<u32, u32> = TtlCache::new(8, Duration::from_secs(60));
        let result = cache.get_or_try_insert_with(1, || Err(crate::Error::Empty));
        assert!(result.is_err());
        assert!(!cache.contains_key(&1));
    }

    #[test]
    fn concurrent_builds_converge() {
        let cache: Arc<TtlCache<u32, u64>> = Arc::new(TtlCache::new(64, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    (0..32u32)
                        .map(|key| {
                            cache
                                .get_or_try_insert_with(key, || Ok(u64::from(key) * 3))
                                .unwrap()
                        })
                        .sum::<u64>()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), (0..32u64).map(|k| k * 3).sum::<u64>());
        }
        assert_eq!(cache.len(), 32);
    }
}
