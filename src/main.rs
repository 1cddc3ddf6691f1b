//! Viewport Cache admin server
//!
//! Runs one cache service and exposes its operational surface:
//!
//! ```text
//! GET  /healthz, /livez        liveness
//! GET  /readyz                 readiness + shared tier ping
//! GET  /metrics                Prometheus text format
//! GET  /stats                  JSON snapshot (stats, tier metrics)
//! POST /stats/reset            zero all counters
//! POST /invalidate?lat=&lng=   purge tiles around a point
//! POST /invalidate/all         purge every tile
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use viewport_cache::cache::InMemorySharedBackend;
use viewport_cache::monitoring::PrometheusExporter;
use viewport_cache::{GeoRecord, ServiceConfig, ViewportCacheService};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Viewport Cache - tile-based geospatial query cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; defaults apply when omitted
    #[arg(long, env = "VIEWPORT_CACHE_CONFIG")]
    config: Option<String>,

    /// Admin server bind address
    #[arg(long, env = "ADMIN_ADDR", default_value = "0.0.0.0:8080")]
    admin_addr: String,

    /// Interval between expired-entry sweeps of the in-memory shared tier
    #[arg(long, env = "PURGE_INTERVAL_SECONDS", default_value = "60")]
    purge_interval_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

type Service = ViewportCacheService<GeoRecord>;

struct AppState {
    service: Service,
    exporter: PrometheusExporter,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Viewport Cache");
    info!("  Admin address: {}", args.admin_addr);

    let config = match &args.config {
        Some(path) => ServiceConfig::load(path).with_context(|| format!("loading {}", path))?,
        None => ServiceConfig::default(),
    };

    info!("  L1 max entries: {}", config.cache.l1.max_entries);
    info!("  L1 TTL: {:?}", config.cache.l1.default_ttl);
    info!("  Tile TTL: {:?}", config.tiles.tile_ttl);
    info!(
        "  Precision range: {}..={}",
        config.tiling.min_precision, config.tiling.max_precision
    );

    let backend = Arc::new(InMemorySharedBackend::new());
    let service = Service::with_backend(config, backend.clone())?;
    let exporter = PrometheusExporter::new()?;
    let state = Arc::new(AppState { service, exporter });

    // Expired entries are otherwise only dropped when read
    let interval = Duration::from_secs(args.purge_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = backend.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired shared tier entries");
            }
        }
    });

    let admin_addr = args.admin_addr.clone();
    let admin_state = Arc::clone(&state);
    let server = tokio::spawn(async move {
        if let Err(e) = run_admin_server(&admin_addr, admin_state).await {
            error!("Admin server error: {:#}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
        _ = server => warn!("Admin server exited"),
    }

    state.service.health_check().set_ready(false);
    state.service.health_check().set_live(false);

    info!("Viewport Cache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Admin Server
// =============================================================================

async fn run_admin_server(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid admin server address: {}", addr))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind admin server on {}", addr))?;

    info!("Admin server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await.context("admin server accept error")?;

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { handle(req, state).await }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Admin server connection error: {}", e);
            }
        });
    }
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let service = &state.service;

    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz" | "/livez") => {
            if service.health_check().is_live() {
                text(StatusCode::OK, "ok")
            } else {
                text(StatusCode::SERVICE_UNAVAILABLE, "shutting down")
            }
        }
        (&Method::GET, "/readyz") => {
            let health = service.health().await;
            let status = if health.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json(status, &health)
        }
        (&Method::GET, "/metrics") => {
            state.exporter.update(&service.stats(), &service.manager().metrics());
            match state.exporter.render() {
                Ok(body) => with_content_type(StatusCode::OK, state.exporter.content_type(), body),
                Err(e) => {
                    error!(error = %e, "Failed to encode metrics");
                    text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            }
        }
        (&Method::GET, "/stats") => json(StatusCode::OK, &service.snapshot()),
        (&Method::POST, "/stats/reset") => {
            service.reset_stats();
            json(StatusCode::OK, &service.stats())
        }
        (&Method::POST, "/invalidate") => match parse_location(req.uri().query()) {
            Some((lat, lng)) => match service.invalidate_location(lat, lng).await {
                Ok(report) => json(StatusCode::OK, &report),
                Err(e) => text(StatusCode::BAD_REQUEST, e.to_string()),
            },
            None => text(StatusCode::BAD_REQUEST, "lat and lng query parameters are required"),
        },
        (&Method::POST, "/invalidate/all") => json(StatusCode::OK, &service.invalidate_all().await),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

/// `lat` and `lng` from a query string
fn parse_location(query: Option<&str>) -> Option<(f64, f64)> {
    let mut lat = None;
    let mut lng = None;
    for pair in query?.split('&') {
        match pair.split_once('=') {
            Some(("lat", value)) => lat = value.parse().ok(),
            Some(("lng", value)) => lng = value.parse().ok(),
            _ => {}
        }
    }
    Some((lat?, lng?))
}

fn with_content_type(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    with_content_type(status, "text/plain; charset=utf-8", body)
}

fn json<V: Serialize>(status: StatusCode, value: &V) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => with_content_type(status, "application/json", body),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
