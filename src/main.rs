//! Caster Core daemon
//!
//! Opens the content cache, then serves health checks and Prometheus metrics
//! until interrupted.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         caster-core                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  CastService │───▶│  Dispatcher  │───▶│ ContentCache │       │
//! │  └──────────────┘    └──────────────┘    └──────┬───────┘       │
//! │                                                 │ stats          │
//! │  /healthz /readyz                    /metrics ◀─┘                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use caster_core::cast::RendererSet;
use caster_core::telemetry::{CacheExporter, HealthCheck, HealthStatus};
use caster_core::{CastService, CasterConfig, ContentCache};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Caster Core - content cache and cast dispatcher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "CASTER_CONFIG")]
    config: Option<PathBuf>,

    /// Cache root directory (overrides the configuration file)
    #[arg(long, env = "CASTER_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Memory tier capacity in MiB (overrides the configuration file)
    #[arg(long, env = "CASTER_CAPACITY_MB")]
    capacity_mb: Option<u64>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn load_config(&self) -> caster_core::Result<CasterConfig> {
        let mut config = match &self.config {
            Some(path) => CasterConfig::from_yaml_file(path)?,
            None => CasterConfig::default(),
        };
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(mb) = self.capacity_mb {
            config.capacity_bytes = mb.saturating_mul(1024 * 1024);
        }
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting caster-core");

    let config = args.load_config().context("load configuration")?;
    info!("  Cache directory: {}", config.cache_dir.display());
    info!("  Memory capacity: {} bytes", config.capacity_bytes);

    let health = Arc::new(HealthCheck::new());

    let cache = ContentCache::open(&config).await.map_err(|e| {
        error!("Failed to open cache directory: {}", e);
        e
    })?;
    let cache = Arc::new(cache);

    let stats = cache.stats();
    info!(
        disk_items = stats.disk_item_count,
        disk_bytes = stats.total_size_bytes,
        "Cache opened"
    );

    let renderers = RendererSet::new();
    if renderers.registered().is_empty() {
        warn!("No renderers registered; only cache:// sources can be cast");
    }
    let service = Arc::new(CastService::new(cache, renderers));
    health.set_ready(true);

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_state = health.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_state).await {
            error!("Health server error: {:#}", e);
        }
    });

    // Start metrics server
    let exporter = Arc::new(CacheExporter::new()?);
    let metrics_addr = args.metrics_addr.clone();
    let metrics_service = service.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_service, exporter).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;

    health.set_ready(false);
    let sessions = service.list_sessions().sessions.len();
    info!(
        sessions,
        uptime_secs = health.uptime().as_secs(),
        "caster-core shutdown complete"
    );
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
        if let Ok(directive) = directive.parse() {
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
// HTTP Helpers
// =============================================================================

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn health_response(status: HealthStatus) -> Response<Full<Bytes>> {
    match status {
        HealthStatus::Healthy => respond(StatusCode::OK, "ok"),
        HealthStatus::Unhealthy => respond(StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    }
}

async fn bind(addr: &str, name: &str) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid {} server address {}", name, addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {} server on {}", name, addr))?;
    info!("{} server listening on {}", name, addr);
    Ok(listener)
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, health: Arc<HealthCheck>) -> anyhow::Result<()> {
    let listener = bind(addr, "Health").await?;

    loop {
        let (stream, _) = listener.accept().await.context("health server accept")?;
        let io = TokioIo::new(stream);
        let health = health.clone();

        tokio::spawn(async move {
            let handler = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = match req.uri().path() {
                    "/healthz" | "/livez" => health_response(health.liveness()),
                    "/readyz" => health_response(health.readiness()),
                    _ => respond(StatusCode::NOT_FOUND, "not found"),
                };
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    service: Arc<CastService>,
    exporter: Arc<CacheExporter>,
) -> anyhow::Result<()> {
    let listener = bind(addr, "Metrics").await?;

    loop {
        let (stream, _) = listener.accept().await.context("metrics server accept")?;
        let io = TokioIo::new(stream);
        let service = service.clone();
        let exporter = exporter.clone();

        tokio::spawn(async move {
            let handler = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = match req.uri().path() {
                    "/metrics" => scrape(&service, &exporter),
                    _ => respond(StatusCode::NOT_FOUND, "not found"),
                };
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}

fn scrape(service: &CastService, exporter: &CacheExporter) -> Response<Full<Bytes>> {
    exporter.refresh(&service.cache_stats());
    match exporter.encode() {
        Ok((body, content_type)) => {
            let mut response = respond(StatusCode::OK, body);
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            error!("Metrics scrape failed: {}", e);
            respond(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
        }
    }
}
