//! Cache Entry Types
//!
//! Keys, per-write options and the content hash shared by every tier.

use std::fmt;
use std::time::Duration;

/// Cache key - namespace plus key within the namespace
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    namespace: String,
    key: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// Get namespace
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get key within the namespace
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Storage key as used by the shared tier: `<namespace>:<key>`
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.namespace, self.key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

/// Options for a single cache write
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Shared-tier TTL
    pub ttl: Duration,
    /// Memory-tier TTL; clamped so it never exceeds `ttl`
    pub l1_ttl: Option<Duration>,
    /// Tags registered with the shared tier
    pub tags: Vec<String>,
}

impl CacheOptions {
    /// Options with the given shared-tier TTL and no tags
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            l1_ttl: None,
            tags: Vec::new(),
        }
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Override the memory-tier TTL
    pub fn l1_ttl(mut self, ttl: Duration) -> Self {
        self.l1_ttl = Some(ttl);
        self
    }

    /// Memory-tier TTL for this write, never longer than the shared TTL
    pub fn effective_l1_ttl(&self, default_l1_ttl: Duration) -> Duration {
        self.l1_ttl.unwrap_or(default_l1_ttl).min(self.ttl)
    }
}

/// Fast non-cryptographic content hash (FxHash algorithm)
#[inline]
pub fn content_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}
