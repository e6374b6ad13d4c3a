//! Content Cache
//!
//! Two-tier artifact cache keyed by content identity.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ContentCache                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │  Memory Tier (RAM)          strict LRU, byte capacity    │   │
//! │  │  └── HashMap + recency index under one RwLock            │   │
//! │  └────────────────────────────▲────────────────────────────┘   │
//! │               evict (demote)  │  promote on disk hit           │
//! │  ┌────────────────────────────┴────────────────────────────┐   │
//! │  │  Disk Tier                  every artifact, write-through │   │
//! │  │  └── <id>.bin + <id>.json, temp file + rename            │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                                                                 │
//! │  SingleFlight: one production per ArtifactId, shared result     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod disk;
pub mod entry;
pub mod flight;
pub mod manager;
pub mod memory;
pub mod metrics;

pub use disk::DiskTier;
pub use entry::{ArtifactEntry, ArtifactId, ArtifactMetadata, RenderOutput};
pub use flight::SingleFlight;
pub use manager::{CacheStats, ContentCache, Resolution};
pub use memory::MemoryTier;
pub use metrics::{CacheMetrics, MetricsSnapshot};
