//! L2 Cache - Shared Tier
//!
//! Cross-process cache reached through a pluggable [`SharedBackend`].
//! This tier is authoritative: entries carry the long TTL and the tags
//! used for targeted and bulk invalidation.
//!
//! # Failure Semantics
//!
//! Backend errors never fail a read. [`L2Cache::get`] logs the error,
//! counts it, and reports a miss so callers fall through to the source.
//! Writes and invalidations return the error for the caller to log or
//! report.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;

use super::compression::PayloadCodec;
use super::entry::CacheKey;
use super::MAX_TTL;
use crate::error::Result;

/// Shared storage backend trait
///
/// Implementations must provide independently atomic per-key operations.
/// No multi-key transactions are required.
#[async_trait]
pub trait SharedBackend: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    /// Get a value; expired values are absent
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Set a value with a TTL, registering it under each tag
    async fn set(&self, key: &str, value: Bytes, ttl: Duration, tags: &[String]) -> Result<()>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every value registered under a tag; returns how many were removed
    async fn invalidate_tag(&self, tag: &str) -> Result<u64>;

    /// Check the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Get backend statistics
    fn stats(&self) -> SharedBackendStats;
}

/// Shared backend statistics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedBackendStats {
    /// Values currently stored (may include expired, uncollected ones)
    pub object_count: u64,
    /// Tags with at least one registered key
    pub tag_count: u64,
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
    /// Values removed through tag invalidation
    pub tag_invalidations: u64,
}

struct StoredValue {
    data: Bytes,
    expires_at: Instant,
    tags: Vec<String>,
}

/// In-memory shared backend
///
/// Used as the default single-process backend and in tests. DashMap
/// guards are never held across a second map operation.
#[derive(Default)]
pub struct InMemorySharedBackend {
    values: DashMap<String, StoredValue>,
    tags: DashMap<String, HashSet<String>>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    tag_invalidations: AtomicU64,
}

impl InMemorySharedBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values, expired or not
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if backend holds no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop every expired value; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .values
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut purged = 0;
        for key in expired {
            let lapsed = |_: &String, value: &StoredValue| value.expires_at <= now;
            if let Some((key, value)) = self.values.remove_if(&key, lapsed) {
                self.untag(&key, &value.tags);
                purged += 1;
            }
        }
        purged
    }

    /// Drop `key` from each tag set, removing sets left empty
    fn untag(&self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(mut keys) = self.tags.get_mut(tag) {
                keys.remove(key);
            }
            self.tags.remove_if(tag, |_, keys| keys.is_empty());
        }
    }
}

#[async_trait]
impl SharedBackend for InMemorySharedBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        match self.values.get(key) {
            None => return Ok(None),
            Some(value) if value.expires_at > now => return Ok(Some(value.data.clone())),
            Some(_) => {}
        }

        if let Some((key, value)) = self.values.remove_if(key, |_, value| value.expires_at <= now) {
            self.untag(&key, &value.tags);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration, tags: &[String]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }

        let previous = self.values.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: Instant::now() + ttl.min(MAX_TTL),
                tags: tags.to_vec(),
            },
        );

        if let Some(previous) = previous {
            let dropped: Vec<String> = previous
                .tags
                .into_iter()
                .filter(|tag| !tags.contains(tag))
                .collect();
            self.untag(key, &dropped);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        match self.values.remove(key) {
            Some((key, value)) => {
                self.untag(&key, &value.tags);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<u64> {
        let Some((_, keys)) = self.tags.remove(tag) else {
            return Ok(0);
        };

        let mut removed = 0u64;
        for key in keys {
            // A key rewritten without this tag keeps its new value
            let tag_owned = |_: &String, value: &StoredValue| value.tags.iter().any(|t| t == tag);
            if let Some((key, value)) = self.values.remove_if(&key, tag_owned) {
                self.untag(&key, &value.tags);
                removed += 1;
            }
        }

        self.tag_invalidations.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> SharedBackendStats {
        SharedBackendStats {
            object_count: self.values.len() as u64,
            tag_count: self.tags.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            tag_invalidations: self.tag_invalidations.load(Ordering::Relaxed),
        }
    }
}

/// L2 Cache - shared tier
pub struct L2Cache {
    backend: Arc<dyn SharedBackend>,
    codec: PayloadCodec,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl L2Cache {
    /// Create a new L2 cache over the given backend
    pub fn new(backend: Arc<dyn SharedBackend>, codec: PayloadCodec) -> Self {
        Self {
            backend,
            codec,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Create with an in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySharedBackend::new()), PayloadCodec::default())
    }

    /// Get a value. Backend and decode failures are reported as misses.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let storage_key = key.storage_key();

        let framed = match self.backend.get(&storage_key).await {
            Ok(Some(framed)) => framed,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %storage_key, error = %e, "Shared tier read failed, treating as miss");
                return None;
            }
        };

        match self.codec.decode(&framed) {
            Ok(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %storage_key, error = %e, "Undecodable shared tier payload, treating as miss");
                None
            }
        }
    }

    /// Store a value with TTL and tags
    pub async fn set(&self, key: &CacheKey, data: &[u8], ttl: Duration, tags: &[String]) -> Result<()> {
        let framed = self.codec.encode(data);
        self.backend
            .set(&key.storage_key(), framed, ttl, tags)
            .await
            .inspect_err(|_| {
                self.errors.fetch_add(1, Ordering::Relaxed);
            })
    }

    /// Delete a value
    pub async fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.backend.delete(&key.storage_key()).await
    }

    /// Remove every value registered under a tag
    pub async fn invalidate_tag(&self, tag: &str) -> Result<u64> {
        self.backend.invalidate_tag(tag).await.inspect_err(|_| {
            self.errors.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Check backend reachability
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    /// Backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get backend error count
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
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

    /// Get cache statistics
    pub fn stats(&self) -> L2Stats {
        L2Stats {
            hits: self.hits(),
            misses: self.misses(),
            errors: self.errors(),
            hit_ratio: self.hit_ratio(),
            backend: self.backend.stats(),
        }
    }
}

/// L2 cache statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct L2Stats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub hit_ratio: f64,
    pub backend: SharedBackendStats,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const TTL: Duration = Duration::from_secs(300);

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    struct BrokenBackend;

    #[async_trait]
    impl SharedBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
            Err(Error::SharedTier("connection refused".into()))
        }
        async fn set(&self, _: &str, _: Bytes, _: Duration, _: &[String]) -> Result<()> {
            Err(Error::SharedTier("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(Error::SharedTier("connection refused".into()))
        }
        async fn invalidate_tag(&self, _tag: &str) -> Result<u64> {
            Err(Error::SharedTier("connection refused".into()))
        }
        async fn ping(&self) -> Result<()> {
            Err(Error::SharedTier("connection refused".into()))
        }
        fn stats(&self) -> SharedBackendStats {
            SharedBackendStats::default()
        }
    }

    #[tokio::test]
    async fn test_backend_set_get() {
        let backend = InMemorySharedBackend::new();
        backend
            .set("viewport:gcpv", Bytes::from_static(b"[]"), TTL, &tags(&["tile:gcpv"]))
            .await
            .unwrap();

        let value = backend.get("viewport:gcpv").await.unwrap();
        assert_eq!(value, Some(Bytes::from_static(b"[]")));
        assert_eq!(backend.stats().tag_count, 1);
    }

    #[tokio::test]
    async fn test_backend_oversized_ttl_is_clamped() {
        let backend = InMemorySharedBackend::new();
        backend
            .set("k", Bytes::from_static(b"v"), Duration::MAX, &[])
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(backend.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_backend_expiry() {
        let backend = InMemorySharedBackend::new();
        backend
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(20), &[])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_backend_purge_expired() {
        let backend = InMemorySharedBackend::new();
        backend
            .set("short", Bytes::from_static(b"v"), Duration::from_millis(10), &[])
            .await
            .unwrap();
        backend.set("long", Bytes::from_static(b"v"), TTL, &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_tag_removes_only_tagged() {
        let backend = InMemorySharedBackend::new();
        backend
            .set("a", Bytes::from_static(b"1"), TTL, &tags(&["viewport", "tile:gcpv"]))
            .await
            .unwrap();
        backend
            .set("b", Bytes::from_static(b"2"), TTL, &tags(&["viewport", "tile:gcpu"]))
            .await
            .unwrap();

        assert_eq!(backend.invalidate_tag("tile:gcpv").await.unwrap(), 1);
        assert!(backend.get("a").await.unwrap().is_none());
        assert!(backend.get("b").await.unwrap().is_some());

        // Second sweep is a no-op
        assert_eq!(backend.invalidate_tag("tile:gcpv").await.unwrap(), 0);

        assert_eq!(backend.invalidate_tag("viewport").await.unwrap(), 1);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_rewritten_key_without_tag_survives() {
        let backend = InMemorySharedBackend::new();
        backend
            .set("a", Bytes::from_static(b"old"), TTL, &tags(&["tile:gcpv"]))
            .await
            .unwrap();
        backend.set("a", Bytes::from_static(b"new"), TTL, &[]).await.unwrap();

        assert_eq!(backend.invalidate_tag("tile:gcpv").await.unwrap(), 0);
        assert_eq!(
            backend.get("a").await.unwrap(),
            Some(Bytes::from_static(b"new"))
        );
    }

    #[tokio::test]
    async fn test_tag_index_shrinks_with_values() {
        let backend = InMemorySharedBackend::new();
        for i in 0..100 {
            let key = format!("viewport:cell{}", i);
            let tile = format!("tile:cell{}", i);
            let ttl = Duration::from_millis(1);
            backend
                .set(&key, Bytes::from_static(b"[]"), ttl, &tags(&["viewport", tile.as_str()]))
                .await
                .unwrap();
        }
        assert_eq!(backend.stats().tag_count, 101);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.purge_expired(), 100);
        assert_eq!(backend.stats().tag_count, 0);

        backend
            .set("a", Bytes::from_static(b"1"), TTL, &tags(&["viewport", "tile:gcpv"]))
            .await
            .unwrap();
        backend
            .set("b", Bytes::from_static(b"2"), TTL, &tags(&["viewport", "tile:gcpu"]))
            .await
            .unwrap();
        // Rewrite drops the tags the new value no longer carries
        backend
            .set("a", Bytes::from_static(b"3"), TTL, &tags(&["viewport"]))
            .await
            .unwrap();
        assert_eq!(backend.stats().tag_count, 2);

        assert_eq!(backend.invalidate_tag("tile:gcpu").await.unwrap(), 1);
        assert_eq!(backend.stats().tag_count, 1);

        assert!(backend.delete("a").await.unwrap());
        assert_eq!(backend.stats().tag_count, 0);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_expired_read_releases_tags() {
        let backend = InMemorySharedBackend::new();
        backend
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(5), &tags(&["tile:gcpv"]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.stats().tag_count, 0);
    }

    #[tokio::test]
    async fn test_l2_cache_roundtrip_with_compression() {
        let cache = L2Cache::in_memory();
        let key = CacheKey::new("viewport", "gcpv");
        let payload = "[".to_string() + &r#"{"id":"farm","lat":51.5},"#.repeat(100) + "{}]";

        cache.set(&key, payload.as_bytes(), TTL, &[]).await.unwrap();
        let value = cache.get(&key).await.unwrap();

        assert_eq!(value.as_ref(), payload.as_bytes());
        assert_eq!(cache.hits(), 1);
    }

    #[tokio::test]
    async fn test_l2_cache_miss() {
        let cache = L2Cache::in_memory();
        assert!(cache.get(&CacheKey::new("viewport", "none")).await.is_none());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.errors(), 0);
    }

    #[tokio::test]
    async fn test_l2_backend_failure_is_a_miss() {
        let cache = L2Cache::new(Arc::new(BrokenBackend), PayloadCodec::default());
        let key = CacheKey::new("viewport", "gcpv");

        assert!(cache.get(&key).await.is_none());
        assert!(cache.set(&key, b"[]", TTL, &[]).await.is_err());
        assert!(cache.invalidate_tag("viewport").await.is_err());
        assert!(cache.ping().await.is_err());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.errors, 3);
    }

    #[tokio::test]
    async fn test_l2_corrupt_payload_is_a_miss() {
        let backend = Arc::new(InMemorySharedBackend::new());
        backend
            .set("viewport:gcpv", Bytes::from_static(b"\x09junk"), TTL, &[])
            .await
            .unwrap();
        let cache = L2Cache::new(backend, PayloadCodec::default());

        assert!(cache.get(&CacheKey::new("viewport", "gcpv")).await.is_none());
        assert_eq!(cache.errors(), 1);
    }
}
