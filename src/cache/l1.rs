//! L1 Cache - Process Memory Tier
//!
//! Bounded per-process cache with a short TTL.
//!
//! # Design
//!
//! - Hard cap on entry count; a full cache evicts before inserting
//! - Eviction order follows [`EvictionPolicy`]: insertion order by default
//! - Sequence-stamped queue; stale queue slots are skipped lazily
//! - Expired entries are dropped on read
//! - No tag index: targeted invalidation clears the whole tier

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::entry::CacheKey;
use super::policy::EvictionPolicy;
use super::{DEFAULT_L1_MAX_ENTRIES, DEFAULT_L1_TTL, MAX_TTL};

/// L1 Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct L1Config {
    /// Maximum number of entries
    pub max_entries: usize,
    /// TTL applied when a write does not specify one
    #[serde(with = "crate::config::serde_secs")]
    pub default_ttl: Duration,
    /// Eviction order when full
    pub eviction_policy: EvictionPolicy,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_L1_MAX_ENTRIES,
            default_ttl: DEFAULT_L1_TTL,
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

struct Slot {
    data: Bytes,
    expires_at: Instant,
    seq: u64,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct Inner {
    map: HashMap<CacheKey, Slot>,
    /// (sequence, key) in eviction order; slots whose sequence no longer
    /// matches the map are stale and skipped
    order: VecDeque<(u64, CacheKey)>,
    next_seq: u64,
}

impl Inner {
    fn stamp(&mut self, key: &CacheKey) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        seq
    }

    /// Remove the entry at the front of the queue; false if none is live
    fn evict_front(&mut self) -> bool {
        while let Some((seq, key)) = self.order.pop_front() {
            let live = self.map.get(&key).is_some_and(|slot| slot.seq == seq);
            if live {
                self.map.remove(&key);
                return true;
            }
        }
        false
    }

    /// Drop stale queue slots once they outnumber live ones
    fn compact(&mut self) {
        if self.order.len() <= self.map.len() * 2 + 16 {
            return;
        }
        let mut live: Vec<(u64, CacheKey)> = self
            .map
            .iter()
            .map(|(key, slot)| (slot.seq, key.clone()))
            .collect();
        live.sort_unstable_by_key(|(seq, _)| *seq);
        self.order = live.into();
    }
}

/// L1 Cache - process memory tier
pub struct L1Cache {
    inner: Mutex<Inner>,
    config: L1Config,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl L1Cache {
    /// Create a new L1 cache with default configuration
    pub fn new() -> Self {
        Self::with_config(L1Config::default())
    }

    /// Create a new L1 cache with custom configuration
    pub fn with_config(config: L1Config) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Get an entry from the cache
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.map.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(slot) => slot.is_expired(now),
        };

        if expired {
            inner.map.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if self.config.eviction_policy.promotes_on_read() {
            let seq = inner.stamp(key);
            if let Some(slot) = inner.map.get_mut(key) {
                slot.seq = seq;
            }
            inner.compact();
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        inner.map.get(key).map(|slot| slot.data.clone())
    }

    /// Put an entry into the cache, replacing any previous value.
    ///
    /// A replaced entry counts as newly inserted.
    pub fn put(&self, key: CacheKey, data: Bytes, ttl: Duration) {
        if self.config.max_entries == 0 {
            return;
        }

        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        let mut inner = self.inner.lock();

        if !inner.map.contains_key(&key) {
            while inner.map.len() >= self.config.max_entries {
                if !inner.evict_front() {
                    break;
                }
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let seq = inner.stamp(&key);
        inner.map.insert(
            key,
            Slot {
                data,
                expires_at,
                seq,
            },
        );
        inner.compact();
    }

    /// Remove an entry from the cache
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.inner.lock().map.remove(key).is_some()
    }

    /// Check if cache holds a live entry for a key
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .map
            .get(key)
            .is_some_and(|slot| !slot.is_expired(now))
    }

    /// Keys in eviction order, next victim first
    pub fn keys(&self) -> Vec<CacheKey> {
        let inner = self.inner.lock();
        let mut keys: Vec<(u64, CacheKey)> = inner
            .map
            .iter()
            .map(|(key, slot)| (slot.seq, key.clone()))
            .collect();
        keys.sort_unstable_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, key)| key).collect()
    }

    /// Get number of entries (including not-yet-collected expired ones)
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get configured maximum entry count
    pub fn max_entries(&self) -> usize {
        self.config.max_entries
    }

    /// Get configured default TTL
    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get count of entries dropped on read after expiry
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> L1Stats {
        L1Stats {
            entries: self.len(),
            max_entries: self.max_entries(),
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            evictions: self.evictions(),
            expirations: self.expirations(),
        }
    }
}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}

/// L1 cache statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct L1Stats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub evictions: u64,
    pub expirations: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn make_key(key: &str) -> CacheKey {
        CacheKey::new("viewport", key)
    }

    fn small_cache(max_entries: usize, eviction_policy: EvictionPolicy) -> L1Cache {
        L1Cache::with_config(L1Config {
            max_entries,
            default_ttl: TTL,
            eviction_policy,
        })
    }

    #[test]
    fn test_l1_cache_creation() {
        let cache = L1Cache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.max_entries(), DEFAULT_L1_MAX_ENTRIES);
        assert_eq!(cache.default_ttl(), DEFAULT_L1_TTL);
    }

    #[test]
    fn test_l1_cache_put_get() {
        let cache = L1Cache::new();
        let key = make_key("gcpv");

        cache.put(key.clone(), Bytes::from_static(b"[]"), TTL);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().as_ref(), b"[]");
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_l1_oversized_ttl_is_clamped() {
        let cache = L1Cache::new();
        let key = make_key("gcpv");

        cache.put(key.clone(), Bytes::from_static(b"[]"), Duration::MAX);
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_l1_cache_miss() {
        let cache = L1Cache::new();
        assert!(cache.get(&make_key("nonexistent")).is_none());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_l1_cache_replace() {
        let cache = L1Cache::new();
        let key = make_key("gcpv");

        cache.put(key.clone(), Bytes::from_static(b"original"), TTL);
        cache.put(key.clone(), Bytes::from_static(b"replaced"), TTL);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().as_ref(), b"replaced");
    }

    #[test]
    fn test_l1_cache_expiry() {
        let cache = L1Cache::new();
        let key = make_key("gcpv");

        cache.put(key.clone(), Bytes::from_static(b"x"), Duration::from_millis(20));
        assert!(cache.contains(&key));
        std::thread::sleep(Duration::from_millis(40));

        assert!(!cache.contains(&key));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.expirations(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_l1_insertion_order_eviction() {
        let cache = small_cache(3, EvictionPolicy::InsertionOrder);

        for i in 0..3 {
            cache.put(make_key(&format!("k{}", i)), Bytes::from_static(b"v"), TTL);
        }
        // Reading k0 does not protect it under insertion order
        assert!(cache.get(&make_key("k0")).is_some());

        cache.put(make_key("k3"), Bytes::from_static(b"v"), TTL);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.evictions(), 1);
        assert!(!cache.contains(&make_key("k0")));
        assert_eq!(
            cache.keys(),
            vec![make_key("k1"), make_key("k2"), make_key("k3")]
        );
    }

    #[test]
    fn test_l1_lru_eviction() {
        let cache = small_cache(3, EvictionPolicy::Lru);

        for i in 0..3 {
            cache.put(make_key(&format!("k{}", i)), Bytes::from_static(b"v"), TTL);
        }
        assert!(cache.get(&make_key("k0")).is_some());

        cache.put(make_key("k3"), Bytes::from_static(b"v"), TTL);

        assert!(cache.contains(&make_key("k0")));
        assert!(!cache.contains(&make_key("k1")));
    }

    #[test]
    fn test_l1_replacing_does_not_evict() {
        let cache = small_cache(2, EvictionPolicy::InsertionOrder);
        cache.put(make_key("a"), Bytes::from_static(b"1"), TTL);
        cache.put(make_key("b"), Bytes::from_static(b"1"), TTL);
        cache.put(make_key("a"), Bytes::from_static(b"2"), TTL);

        assert_eq!(cache.evictions(), 0);
        assert_eq!(cache.keys(), vec![make_key("b"), make_key("a")]);
    }

    #[test]
    fn test_l1_queue_compaction_under_lru_reads() {
        let cache = small_cache(4, EvictionPolicy::Lru);
        let key = make_key("hot");
        cache.put(key.clone(), Bytes::from_static(b"v"), TTL);

        for _ in 0..1000 {
            cache.get(&key);
        }

        assert!(cache.inner.lock().order.len() <= 1 * 2 + 16);
        assert_eq!(cache.keys(), vec![key]);
    }

    #[test]
    fn test_l1_zero_capacity_stores_nothing() {
        let cache = small_cache(0, EvictionPolicy::InsertionOrder);
        cache.put(make_key("a"), Bytes::from_static(b"1"), TTL);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_l1_cache_clear() {
        let cache = L1Cache::new();
        for i in 0..100 {
            cache.put(make_key(&format!("k{}", i)), Bytes::from_static(b"v"), TTL);
        }
        assert_eq!(cache.len(), 100);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_l1_cache_stats() {
        let cache = L1Cache::new();
        let key = make_key("gcpv");
        cache.put(key.clone(), Bytes::from_static(b"v"), TTL);
        cache.get(&key);
        cache.get(&make_key("nonexistent"));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio, 0.5);
    }

    #[test]
    fn test_l1_cache_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(small_cache(500, EvictionPolicy::InsertionOrder));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = make_key(&format!("t{}-{}", t, i));
                        cache.put(key.clone(), Bytes::from_static(b"v"), TTL);
                        cache.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 500);
        assert_eq!(cache.evictions(), 1600 - 500);
    }

    proptest::proptest! {
        #[test]
        fn prop_eviction_keeps_newest_entries(max_entries in 1usize..20, inserts in 0usize..60) {
            let cache = small_cache(max_entries, EvictionPolicy::InsertionOrder);
            for i in 0..inserts {
                cache.put(make_key(&format!("tile{}", i)), Bytes::from_static(b"[]"), TTL);
                proptest::prop_assert!(cache.len() <= max_entries);
            }

            let kept = inserts.min(max_entries);
            let expected: Vec<CacheKey> = (inserts - kept..inserts)
                .map(|i| make_key(&format!("tile{}", i)))
                .collect();
            proptest::prop_assert_eq!(cache.keys(), expected);
        }
    }
}
