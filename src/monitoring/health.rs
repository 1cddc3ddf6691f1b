//! Health Checks
//!
//! The service reports two components: the process itself (live and
//! accepting queries) and the shared tier. An unreachable shared tier
//! degrades the service without taking it down, because tile lookups
//! fall through to the source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::cache::MultiTierCacheManager;

/// Health status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but every lookup misses the shared tier
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        *self != HealthStatus::Unhealthy
    }

    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }
}

/// Status of one component
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Worst component status
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    /// Tiles held in process memory
    pub memory_tier_entries: usize,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// Liveness and readiness flags for one service
pub struct HealthCheck {
    started: Instant,
    live: AtomicBool,
    ready: AtomicBool,
}

impl HealthCheck {
    /// Live but not yet ready
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    fn process(&self) -> ComponentHealth {
        let detail = if !self.is_live() {
            Some("shutting down")
        } else if !self.ready.load(Ordering::Relaxed) {
            Some("not accepting queries")
        } else {
            None
        };

        ComponentHealth {
            component: "process".to_string(),
            status: if detail.is_some() {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Healthy
            },
            detail: detail.map(str::to_string),
            latency_ms: None,
        }
    }

    async fn shared_tier(&self, manager: &MultiTierCacheManager) -> ComponentHealth {
        let start = Instant::now();
        let outcome = manager.ping().await;

        ComponentHealth {
            component: format!("shared-tier ({})", manager.l2().backend_name()),
            status: if outcome.is_ok() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            detail: outcome.err().map(|e| e.to_string()),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        }
    }

    /// Check every component against the given cache tiers
    pub async fn report(&self, manager: &MultiTierCacheManager) -> HealthResponse {
        let components = vec![self.process(), self.shared_tier(manager).await];
        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthResponse {
            status,
            components,
            memory_tier_entries: manager.l1().len(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, SharedBackend, SharedBackendStats};
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    struct UnreachableBackend;

    #[async_trait]
    impl SharedBackend for UnreachableBackend {
        fn name(&self) -> &'static str {
            "unreachable"
        }
        async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
            Err(Error::SharedTier("timed out".into()))
        }
        async fn set(&self, _: &str, _: Bytes, _: Duration, _: &[String]) -> Result<()> {
            Err(Error::SharedTier("timed out".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(Error::SharedTier("timed out".into()))
        }
        async fn invalidate_tag(&self, _tag: &str) -> Result<u64> {
            Err(Error::SharedTier("timed out".into()))
        }
        async fn ping(&self) -> Result<()> {
            Err(Error::SharedTier("timed out".into()))
        }
        fn stats(&self) -> SharedBackendStats {
            SharedBackendStats::default()
        }
    }

    #[test]
    fn test_status_order() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded < HealthStatus::Unhealthy);
        assert!(HealthStatus::Degraded.is_operational());
        assert!(!HealthStatus::Unhealthy.is_operational());
    }

    #[tokio::test]
    async fn test_ready_service_with_in_memory_tier() {
        let health = HealthCheck::new();
        health.set_ready(true);
        let manager = MultiTierCacheManager::in_memory();

        let response = health.report(&manager).await;
        assert!(response.status.is_healthy());
        assert_eq!(response.components[1].component, "shared-tier (in-memory)");
        assert_eq!(response.memory_tier_entries, 0);
    }

    #[tokio::test]
    async fn test_not_ready_is_unhealthy() {
        let health = HealthCheck::new();
        let manager = MultiTierCacheManager::in_memory();
        assert_eq!(health.report(&manager).await.status, HealthStatus::Unhealthy);

        health.set_ready(true);
        health.set_live(false);
        let response = health.report(&manager).await;
        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(response.components[0].detail.as_deref(), Some("shutting down"));
    }

    #[tokio::test]
    async fn test_unreachable_shared_tier_degrades() {
        let health = HealthCheck::new();
        health.set_ready(true);
        let manager =
            MultiTierCacheManager::with_config(CacheConfig::default(), Arc::new(UnreachableBackend));

        let response = health.report(&manager).await;
        assert_eq!(response.status, HealthStatus::Degraded);
        assert!(response.status.is_operational());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"][1]["detail"], "Shared tier error: timed out");
    }
}
