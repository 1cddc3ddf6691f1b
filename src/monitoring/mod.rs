//! Observability
//!
//! Health checks and Prometheus exposition for the admin endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Admin endpoints                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐      ┌───────────────────────────┐  │
//! │  │ Health Checks        │      │ PrometheusExporter        │  │
//! │  │ liveness/readiness   │      │ CacheStats +              │  │
//! │  │ shared tier ping     │      │ MetricsSnapshot gauges    │  │
//! │  └──────────────────────┘      └───────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod health;
mod exporter;

pub use exporter::PrometheusExporter;
pub use health::{ComponentHealth, HealthCheck, HealthResponse, HealthStatus};
