//! Telemetry
//!
//! Prometheus export of cache statistics and the readiness flag served by the
//! health endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::error::{Error, Result};

// =============================================================================
// Prometheus Export
// =============================================================================

/// Gauges and counters mirroring [`CacheStats`], refreshed on every scrape
pub struct CacheExporter {
    registry: Registry,
    memory_items: IntGauge,
    disk_items: IntGauge,
    total_bytes: IntGauge,
    memory_bytes: IntGauge,
    capacity_bytes: IntGauge,
    in_flight: IntGauge,
    memory_hits: IntCounter,
    disk_hits: IntCounter,
    misses: IntCounter,
    evictions: IntCounter,
    productions: IntCounter,
    production_failures: IntCounter,
}

fn register<M: Collector + Clone + 'static>(
    registry: &Registry,
    name: &str,
    metric: prometheus::Result<M>,
) -> Result<M> {
    let metric = metric.map_err(|e| Error::Internal(format!("Invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(metric.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(metric)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    register(registry, name, IntGauge::new(name, help))
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    register(registry, name, IntCounter::new(name, help))
}

/// Advance a counter to a monotonic source total
fn advance(counter: &IntCounter, total: u64) {
    counter.inc_by(total.saturating_sub(counter.get()));
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl CacheExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            memory_items: gauge(&registry, "caster_cache_memory_items", "Artifacts resident in memory")?,
            disk_items: gauge(&registry, "caster_cache_disk_items", "Artifacts stored on disk")?,
            total_bytes: gauge(&registry, "caster_cache_total_bytes", "Bytes stored on disk")?,
            memory_bytes: gauge(&registry, "caster_cache_memory_bytes", "Bytes resident in memory")?,
            capacity_bytes: gauge(&registry, "caster_cache_capacity_bytes", "Memory tier capacity")?,
            in_flight: gauge(&registry, "caster_cache_in_flight", "Productions currently running")?,
            memory_hits: counter(&registry, "caster_cache_memory_hits_total", "Lookups served from memory")?,
            disk_hits: counter(&registry, "caster_cache_disk_hits_total", "Lookups served from disk")?,
            misses: counter(&registry, "caster_cache_misses_total", "Lookups that found nothing")?,
            evictions: counter(&registry, "caster_cache_evictions_total", "Memory tier evictions")?,
            productions: counter(
                &registry,
                "caster_cache_productions_total",
                "Renders run, including failures",
            )?,
            production_failures: counter(
                &registry,
                "caster_cache_production_failures_total",
                "Failed renders",
            )?,
            registry,
        })
    }

    pub fn refresh(&self, stats: &CacheStats) {
        self.memory_items.set(clamp(stats.memory_item_count));
        self.disk_items.set(clamp(stats.disk_item_count));
        self.total_bytes.set(clamp(stats.total_size_bytes));
        self.memory_bytes.set(clamp(stats.memory_size_bytes));
        self.capacity_bytes.set(clamp(stats.capacity_bytes));
        self.in_flight.set(clamp(stats.in_flight));
        advance(&self.memory_hits, stats.memory_hits);
        advance(&self.disk_hits, stats.disk_hits);
        advance(&self.misses, stats.misses);
        advance(&self.evictions, stats.evictions);
        advance(&self.productions, stats.productions);
        advance(&self.production_failures, stats.production_failures);
    }

    /// Text exposition of the current values
    pub fn encode(&self) -> Result<(Vec<u8>, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok((buffer, encoder.format_type().to_string()))
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Liveness and readiness flags for the health endpoints
pub struct HealthCheck {
    start_time: Instant,
    live: AtomicBool,
    ready: AtomicBool,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    pub fn liveness(&self) -> HealthStatus {
        if self.live.load(Ordering::Relaxed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Ready once the cache directory has been opened and scanned
    pub fn readiness(&self) -> HealthStatus {
        if self.ready.load(Ordering::Relaxed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}
