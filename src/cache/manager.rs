//! Content Cache - two-tier facade
//!
//! Composes the Memory Tier and the Disk Tier with write-through: every
//! stored artifact is persisted before it becomes resident, so eviction only
//! demotes. Disk hits are promoted back into memory as most-recently-used.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use super::disk::DiskTier;
use super::entry::{ArtifactEntry, ArtifactId, RenderOutput};
use super::flight::{IdLocks, SingleFlight};
use super::memory::MemoryTier;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use crate::config::CasterConfig;
use crate::domain::{CastOptions, ContentKind, ContentSource};
use crate::error::{Error, Result};

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Memory Tier hit
    Memory,
    /// Disk Tier hit, promoted into memory
    Disk,
    /// This caller ran the production
    Produced,
    /// This caller joined a production already in flight
    Joined,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Memory => write!(f, "memory"),
            Resolution::Disk => write!(f, "disk"),
            Resolution::Produced => write!(f, "produced"),
            Resolution::Joined => write!(f, "joined"),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_item_count: u64,
    pub disk_item_count: u64,
    /// Every artifact is on disk, so this is the disk total
    pub total_size_bytes: u64,
    pub memory_size_bytes: u64,
    pub capacity_bytes: u64,
    pub in_flight: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub promotions: u64,
    pub productions: u64,
    pub production_failures: u64,
    pub flight_joins: u64,
}

/// Two-tier content cache
pub struct ContentCache {
    memory: MemoryTier,
    disk: DiskTier,
    flights: SingleFlight,
    locks: IdLocks,
    metrics: Arc<CacheMetrics>,
}

impl ContentCache {
    /// Open the cache described by `config`
    pub async fn open(config: &CasterConfig) -> Result<Self> {
        config.validate()?;
        Self::with_capacity(config.cache_dir.clone(), config.capacity_bytes).await
    }

    /// Open a cache rooted at `root` with a memory capacity in bytes
    pub async fn with_capacity(root: impl Into<PathBuf>, capacity_bytes: u64) -> Result<Self> {
        let disk = DiskTier::open(root).await?;
        Ok(Self {
            memory: MemoryTier::new(capacity_bytes),
            disk,
            flights: SingleFlight::new(),
            locks: IdLocks::new(),
            metrics: Arc::new(CacheMetrics::new()),
        })
    }

    /// Store a payload under the identity of (kind, source, options).
    ///
    /// Storing an existing identity replaces the payload and refreshes recency.
    pub async fn store(
        &self,
        kind: ContentKind,
        source: &ContentSource,
        options: &CastOptions,
        payload: impl Into<Bytes>,
        mime_type: impl Into<String>,
    ) -> Result<ArtifactId> {
        if options.kind() != kind {
            return Err(Error::invalid_option(kind.as_str(), "content_type"));
        }

        let id = ArtifactId::compute(kind, source, options);
        let entry = ArtifactEntry::new(id.clone(), kind, payload.into(), mime_type);

        let _guard = self.locks.lock(&id).await;
        self.admit(entry).await?;
        Ok(id)
    }

    /// Write through to disk, then make resident. Caller holds the id lock.
    async fn admit(&self, entry: ArtifactEntry) -> Result<()> {
        let tracker = Instant::now();
        self.disk.put(&entry).await?;
        self.metrics.record_disk_write_latency(tracker.elapsed());
        self.metrics.record_store();

        if !self.memory.fits(entry.size()) {
            debug!(
                artifact_id = %entry.id(),
                size = entry.size(),
                capacity = self.memory.capacity(),
                "Artifact larger than memory capacity, kept on disk only"
            );
            self.memory.remove(entry.id());
            return Ok(());
        }

        self.make_resident(entry);
        Ok(())
    }

    fn make_resident(&self, entry: ArtifactEntry) {
        let admission = self.memory.admit(entry);
        if !admission.evicted.is_empty() {
            self.metrics.record_evictions(admission.evicted.len());
            for evicted in &admission.evicted {
                debug!(artifact_id = %evicted.id(), size = evicted.size(), "Evicted to disk");
            }
        }
    }

    /// Fetch an artifact by id
    pub async fn get(&self, id: &ArtifactId) -> Result<ArtifactEntry> {
        match self.lookup(id).await? {
            Some((entry, _)) => Ok(entry),
            None => Err(Error::NotFound(format!("artifact {}", id))),
        }
    }

    /// Fetch an artifact by id, reporting which tier answered
    pub async fn lookup(&self, id: &ArtifactId) -> Result<Option<(ArtifactEntry, Resolution)>> {
        if let Some(entry) = self.memory.get_and_touch(id) {
            self.metrics.record_memory_hit();
            return Ok(Some((entry, Resolution::Memory)));
        }

        let _guard = self.locks.lock(id).await;

        // Promoted by another caller while we waited
        if let Some(entry) = self.memory.get_and_touch(id) {
            self.metrics.record_memory_hit();
            return Ok(Some((entry, Resolution::Memory)));
        }

        let tracker = Instant::now();
        let loaded = self.disk.get(id).await?;
        self.metrics.record_disk_read_latency(tracker.elapsed());

        match loaded {
            Some(mut entry) => {
                self.metrics.record_disk_hit();
                entry.touch();
                if self.memory.fits(entry.size()) {
                    self.make_resident(entry.clone());
                    self.metrics.record_promotion();
                }
                Ok(Some((entry, Resolution::Disk)))
            }
            None => {
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    /// Resolve an identity, producing it at most once across concurrent
    /// callers when it is not cached.
    ///
    /// The production runs on its own task; a caller that stops waiting does
    /// not cancel it, and its result is stored for later lookups.
    pub async fn get_or_produce<F, Fut>(
        self: &Arc<Self>,
        kind: ContentKind,
        source: &ContentSource,
        options: &CastOptions,
        produce: F,
    ) -> Result<(ArtifactEntry, Resolution)>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RenderOutput>> + Send + 'static,
    {
        let id = ArtifactId::compute(kind, source, options);
        if let Some(hit) = self.lookup(&id).await? {
            return Ok(hit);
        }

        let cache = Arc::clone(self);
        let key = id.clone();
        let (production, started) = self.flights.join_or_start(&id, move || {
            async move { cache.produce_and_store(key, kind, produce).await }.boxed()
        });

        let resolution = if started {
            Resolution::Produced
        } else {
            self.metrics.record_flight_join();
            debug!(artifact_id = %id, "Joined in-flight production");
            Resolution::Joined
        };

        let entry = production.await?;
        Ok((entry, resolution))
    }

    async fn produce_and_store<F, Fut>(
        self: Arc<Self>,
        id: ArtifactId,
        kind: ContentKind,
        produce: F,
    ) -> Result<ArtifactEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RenderOutput>>,
    {
        // A production for this id may have finished between the caller's
        // miss and this one registering.
        if let Some((entry, _)) = self.lookup(&id).await? {
            return Ok(entry);
        }

        let tracker = Instant::now();
        let output = produce().await;
        self.metrics
            .record_production(output.is_ok(), tracker.elapsed());

        let output = output.map_err(|e| {
            warn!(artifact_id = %id, content_type = %kind, error = %e, "Production failed");
            e
        })?;

        let entry = ArtifactEntry::new(id.clone(), kind, output.payload, output.mime_type);
        let _guard = self.locks.lock(&id).await;
        self.admit(entry.clone()).await?;
        debug!(artifact_id = %id, size = entry.size(), "Produced artifact stored");
        Ok(entry)
    }

    /// Remove an artifact from both tiers
    pub async fn remove(&self, id: &ArtifactId) -> Result<()> {
        let _guard = self.locks.lock(id).await;

        let in_memory = self.memory.remove(id).is_some();
        let on_disk = self.disk.delete(id).await?;
        if !in_memory && !on_disk {
            return Err(Error::NotFound(format!("artifact {}", id)));
        }

        self.metrics.record_removal();
        Ok(())
    }

    /// Check if either tier holds an id
    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.memory.contains(id) || self.disk.contains(id)
    }

    /// Check if the Memory Tier holds an id
    pub fn is_resident(&self, id: &ArtifactId) -> bool {
        self.memory.contains(id)
    }

    /// Remove every artifact from both tiers
    ///
    /// Each id is removed under its own lock, so a concurrent `store` either
    /// lands before the removal or survives it in both tiers. Returns the
    /// number of artifacts removed.
    pub async fn clear(&self) -> Result<u64> {
        let mut ids = self.disk.list_ids();
        ids.extend(self.memory.ids_by_recency());
        ids.sort();
        ids.dedup();

        let mut cleared = 0;
        for id in ids {
            let _guard = self.locks.lock(&id).await;
            let in_memory = self.memory.remove(&id).is_some();
            let on_disk = self.disk.delete(&id).await?;
            if in_memory || on_disk {
                cleared += 1;
            }
        }

        if cleared > 0 {
            self.metrics.record_removals(cleared);
        }
        Ok(cleared)
    }

    /// Get statistics
    pub fn stats(&self) -> CacheStats {
        let metrics = self.metrics.snapshot();
        CacheStats {
            memory_item_count: self.memory.len() as u64,
            disk_item_count: self.disk.len() as u64,
            total_size_bytes: self.disk.total_size(),
            memory_size_bytes: self.memory.current_size(),
            capacity_bytes: self.memory.capacity(),
            in_flight: self.flights.len() as u64,
            memory_hits: metrics.memory_hits,
            disk_hits: metrics.disk_hits,
            misses: metrics.misses,
            evictions: metrics.evictions,
            promotions: metrics.promotions,
            productions: metrics.productions,
            production_failures: metrics.production_failures,
            flight_joins: metrics.flight_joins,
        }
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Disk tier root
    pub fn root(&self) -> &std::path::Path {
        self.disk.root()
    }
}

// =============================================================================
// Tests
// =============================================================================
