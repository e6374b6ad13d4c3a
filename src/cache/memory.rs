//! Memory Tier - RAM-resident hot artifacts
//!
//! Capacity-bounded, strictly least-recently-used.
//!
//! # Design
//!
//! - One `RwLock` guards the map, the recency index and the size counter, so
//!   size accounting and recency order can never disagree
//! - Recency is a monotonically increasing tick per access; the smallest tick
//!   is the eviction candidate
//! - `peek` takes the read lock and does not change recency

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::entry::{ArtifactEntry, ArtifactId};

struct Slot {
    entry: ArtifactEntry,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ArtifactId, Slot>,
    /// tick -> id, oldest first
    recency: BTreeMap<u64, ArtifactId>,
    next_tick: u64,
    size: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn insert(&mut self, entry: ArtifactEntry) -> Option<ArtifactEntry> {
        let tick = self.bump();
        let id = entry.id().clone();
        let size = entry.size();

        let old = self.entries.insert(id.clone(), Slot { entry, tick });
        self.recency.insert(tick, id);
        self.size += size;

        old.map(|slot| {
            self.recency.remove(&slot.tick);
            self.size -= slot.entry.size();
            slot.entry
        })
    }

    fn remove(&mut self, id: &ArtifactId) -> Option<ArtifactEntry> {
        let slot = self.entries.remove(id)?;
        self.recency.remove(&slot.tick);
        self.size -= slot.entry.size();
        Some(slot.entry)
    }

    fn evict_until(&mut self, capacity: u64) -> Vec<ArtifactEntry> {
        let mut evicted = Vec::new();
        while self.size > capacity {
            let Some((_, id)) = self.recency.pop_first() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&id) {
                self.size -= slot.entry.size();
                evicted.push(slot.entry);
            }
        }
        evicted
    }
}

/// Result of admitting an entry
#[derive(Debug, Default)]
pub struct Admission {
    /// Previous entry stored under the same id
    pub replaced: Option<ArtifactEntry>,
    /// Entries pushed out to make room, least recently used first
    pub evicted: Vec<ArtifactEntry>,
}

/// Memory Tier - recency-ordered, byte-bounded artifact map
pub struct MemoryTier {
    inner: RwLock<Inner>,
    capacity: u64,
}

impl MemoryTier {
    /// Create a tier that holds at most `capacity` bytes
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity,
        }
    }

    /// Insert (or replace) an entry as most-recently-used without evicting
    pub fn insert(&self, entry: ArtifactEntry) -> Option<ArtifactEntry> {
        self.inner.write().insert(entry)
    }

    /// Insert and evict down to capacity under a single lock acquisition
    pub fn admit(&self, entry: ArtifactEntry) -> Admission {
        let mut inner = self.inner.write();
        let replaced = inner.insert(entry);
        let evicted = inner.evict_until(self.capacity);
        Admission { replaced, evicted }
    }

    /// Look up an entry and mark it most-recently-used
    pub fn get_and_touch(&self, id: &ArtifactId) -> Option<ArtifactEntry> {
        let mut inner = self.inner.write();
        let tick = inner.bump();

        let slot = inner.entries.get_mut(id)?;
        let old_tick = std::mem::replace(&mut slot.tick, tick);
        slot.entry.touch();
        let entry = slot.entry.clone();

        inner.recency.remove(&old_tick);
        inner.recency.insert(tick, id.clone());
        Some(entry)
    }

    /// Look up an entry without changing recency
    pub fn peek(&self, id: &ArtifactId) -> Option<ArtifactEntry> {
        self.inner.read().entries.get(id).map(|slot| slot.entry.clone())
    }

    /// Remove an entry
    pub fn remove(&self, id: &ArtifactId) -> Option<ArtifactEntry> {
        self.inner.write().remove(id)
    }

    /// Evict least-recently-used entries until the tier holds at most
    /// `capacity` bytes
    pub fn evict_until(&self, capacity: u64) -> Vec<ArtifactEntry> {
        self.inner.write().evict_until(capacity)
    }

    /// Check if the tier holds an id
    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.inner.read().entries.contains_key(id)
    }

    /// Ids from least to most recently used
    pub fn ids_by_recency(&self) -> Vec<ArtifactId> {
        self.inner.read().recency.values().cloned().collect()
    }

    /// Current size in bytes
    pub fn current_size(&self) -> u64 {
        self.inner.read().size
    }

    /// Get capacity
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Check if an entry of `size` bytes can ever be resident
    pub fn fits(&self, size: u64) -> bool {
        size <= self.capacity
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if the tier is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
