//! Cache Metrics Collection
//!
//! Counters and latency averages for the content cache. Everything is a
//! relaxed atomic; the values are advisory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    promotions: AtomicU64,
    stores: AtomicU64,
    removals: AtomicU64,

    // Production (single-flight)
    productions: AtomicU64,
    production_failures: AtomicU64,
    flight_joins: AtomicU64,

    // Latencies (microseconds, exponential moving average)
    disk_read_latency_us: AtomicU64,
    disk_write_latency_us: AtomicU64,
    production_latency_us: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removals(&self, count: u64) {
        self.removals.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_production(&self, ok: bool, duration: Duration) {
        self.productions.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.production_failures.fetch_add(1, Ordering::Relaxed);
        }
        update_latency_ema(&self.production_latency_us, duration);
    }

    pub fn record_flight_join(&self) {
        self.flight_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_read_latency(&self, duration: Duration) {
        update_latency_ema(&self.disk_read_latency_us, duration);
    }

    pub fn record_disk_write_latency(&self, duration: Duration) {
        update_latency_ema(&self.disk_write_latency_us, duration);
    }

    pub fn memory_hits(&self) -> u64 {
        self.memory_hits.load(Ordering::Relaxed)
    }

    pub fn disk_hits(&self) -> u64 {
        self.disk_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn productions(&self) -> u64 {
        self.productions.load(Ordering::Relaxed)
    }

    pub fn flight_joins(&self) -> u64 {
        self.flight_joins.load(Ordering::Relaxed)
    }

    /// Fraction of lookups answered by either tier
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.memory_hits() + self.disk_hits()) as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            memory_hits: self.memory_hits(),
            disk_hits: self.disk_hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            evictions: self.evictions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            productions: self.productions(),
            production_failures: self.production_failures.load(Ordering::Relaxed),
            flight_joins: self.flight_joins(),
            disk_read_latency: load_duration(&self.disk_read_latency_us),
            disk_write_latency: load_duration(&self.disk_write_latency_us),
            production_latency: load_duration(&self.production_latency_us),
        }
    }
}

fn update_latency_ema(target: &AtomicU64, duration: Duration) {
    let new_us = duration.as_micros() as u64;
    let alpha = 0.1;

    loop {
        let current = target.load(Ordering::Relaxed);
        let updated = if current == 0 {
            new_us
        } else {
            ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
        };

        if target
            .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
}

fn load_duration(source: &AtomicU64) -> Duration {
    Duration::from_micros(source.load(Ordering::Relaxed))
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub evictions: u64,
    pub promotions: u64,
    pub stores: u64,
    pub removals: u64,
    pub productions: u64,
    pub production_failures: u64,
    pub flight_joins: u64,
    pub disk_read_latency: Duration,
    pub disk_write_latency: Duration,
    pub production_latency: Duration,
}

// =============================================================================
// Tests
// =============================================================================
