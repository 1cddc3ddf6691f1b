//! Memory-Tier Eviction Policy
//!
//! Decides which entry leaves the memory tier when it is full.

use serde::{Deserialize, Serialize};

/// Eviction order for the bounded memory tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Oldest inserted entry leaves first; reads do not affect order
    #[default]
    InsertionOrder,
    /// Least recently read or written entry leaves first
    Lru,
}

impl EvictionPolicy {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::InsertionOrder => "insertion-order",
            EvictionPolicy::Lru => "lru",
        }
    }

    /// Whether a read moves the entry to the back of the eviction queue
    pub fn promotes_on_read(&self) -> bool {
        matches!(self, EvictionPolicy::Lru)
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
