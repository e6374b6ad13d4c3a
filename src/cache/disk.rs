//! Disk Tier - durable artifact store
//!
//! Every admitted artifact lives here; the memory tier is a hot subset.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <id>.bin    payload bytes
//!   <id>.json   ArtifactMetadata (size, checksum, mime, timestamps)
//! ```
//!
//! Both files are written to a temporary name, synced, then renamed into
//! place, payload first. A reader therefore sees either the old pair, the new
//! pair, or a pair whose checksum does not match; the last case is treated as
//! absent and the files are removed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entry::{ArtifactEntry, ArtifactId, ArtifactMetadata};
use crate::error::{Error, Result};

const PAYLOAD_EXT: &str = "bin";
const META_EXT: &str = "json";
const TMP_EXT: &str = "tmp";

/// Disk Tier - one payload file and one metadata file per artifact
#[derive(Debug)]
pub struct DiskTier {
    root: PathBuf,
    /// id -> payload size
    index: DashMap<ArtifactId, u64>,
    total_bytes: AtomicU64,
}

impl DiskTier {
    /// Open (or create) a disk tier rooted at `root`.
    ///
    /// Fails with `Error::Config` when the directory cannot be created or is
    /// not writable. Leftover temporary files and orphaned payloads from an
    /// interrupted write are removed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            Error::Config(format!("cache directory {}: {}", root.display(), e))
        })?;

        let marker = root.join(format!(".writable-{}.{}", Uuid::new_v4(), TMP_EXT));
        fs::write(&marker, b"ok").await.map_err(|e| {
            Error::Config(format!("cache directory {} is not writable: {}", root.display(), e))
        })?;
        let _ = fs::remove_file(&marker).await;

        let tier = Self {
            root,
            index: DashMap::new(),
            total_bytes: AtomicU64::new(0),
        };
        tier.scan().await?;

        info!(
            root = %tier.root.display(),
            artifacts = tier.len(),
            bytes = tier.total_size(),
            "Disk tier opened"
        );
        Ok(tier)
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn payload_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(format!("{}.{}", id, PAYLOAD_EXT))
    }

    fn meta_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(format!("{}.{}", id, META_EXT))
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}.{}", Uuid::new_v4().simple(), TMP_EXT));
        PathBuf::from(name)
    }

    /// Rebuild the in-memory index from the directory contents
    async fn scan(&self) -> Result<()> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::storage(format!("scan {}", self.root.display()), e))?;

        let mut metas = Vec::new();
        let mut payloads = Vec::new();

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| Error::storage("scan", e))?
        {
            let path = item.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(TMP_EXT) => {
                    debug!(path = %path.display(), "Removing leftover temporary file");
                    let _ = fs::remove_file(&path).await;
                }
                Some(META_EXT) => metas.push(path),
                Some(PAYLOAD_EXT) => payloads.push(path),
                _ => {}
            }
        }

        for meta_path in metas {
            let Some(id) = stem_id(&meta_path) else {
                continue;
            };
            match self.read_metadata(&id).await {
                Some(meta) => {
                    let on_disk = fs::metadata(self.payload_path(&id))
                        .await
                        .map(|m| m.len())
                        .ok();
                    if on_disk == Some(meta.size_bytes) {
                        self.index_insert(id, meta.size_bytes);
                    } else {
                        self.drop_corrupt(&id, "payload missing or truncated").await;
                    }
                }
                None => self.drop_corrupt(&id, "unreadable metadata").await,
            }
        }

        for payload_path in payloads {
            let orphan = match stem_id(&payload_path) {
                Some(id) => !self.index.contains_key(&id),
                None => false,
            };
            if orphan {
                debug!(path = %payload_path.display(), "Removing orphaned payload");
                let _ = fs::remove_file(&payload_path).await;
            }
        }

        Ok(())
    }

    async fn read_metadata(&self, id: &ArtifactId) -> Option<ArtifactMetadata> {
        let raw = fs::read(self.meta_path(id)).await.ok()?;
        let meta: ArtifactMetadata = serde_json::from_slice(&raw).ok()?;
        (meta.id == *id).then_some(meta)
    }

    fn index_insert(&self, id: ArtifactId, size: u64) {
        if let Some(old) = self.index.insert(id, size) {
            self.total_bytes.fetch_sub(old, Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
    }

    fn index_remove(&self, id: &ArtifactId) -> bool {
        match self.index.remove(id) {
            Some((_, size)) => {
                self.total_bytes.fetch_sub(size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    async fn drop_corrupt(&self, id: &ArtifactId, reason: &str) {
        warn!(artifact_id = %id, reason, "Dropping corrupt disk record");
        self.index_remove(id);
        let _ = fs::remove_file(self.meta_path(id)).await;
        let _ = fs::remove_file(self.payload_path(id)).await;
    }

    async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }

    /// Persist an entry, replacing any previous record under the same id
    pub async fn put(&self, entry: &ArtifactEntry) -> Result<()> {
        let id = entry.id();
        let payload_path = self.payload_path(id);
        let meta_path = self.meta_path(id);
        let payload_tmp = Self::tmp_path(&payload_path);
        let meta_tmp = Self::tmp_path(&meta_path);

        let meta = serde_json::to_vec(&entry.metadata)
            .map_err(|e| Error::Internal(format!("encode metadata: {}", e)))?;

        let result = async {
            Self::write_synced(&payload_tmp, entry.payload()).await?;
            Self::write_synced(&meta_tmp, &meta).await?;
            fs::rename(&payload_tmp, &payload_path).await?;
            fs::rename(&meta_tmp, &meta_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&payload_tmp).await;
            let _ = fs::remove_file(&meta_tmp).await;
            return Err(Error::storage(format!("write artifact {}", id), e));
        }

        self.index_insert(id.clone(), entry.size());
        debug!(artifact_id = %id, size = entry.size(), "Artifact persisted");
        Ok(())
    }

    /// Read an entry. Records that fail verification are removed and
    /// reported as absent.
    pub async fn get(&self, id: &ArtifactId) -> Result<Option<ArtifactEntry>> {
        let meta = match fs::read(self.meta_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.index_remove(id);
                return Ok(None);
            }
            Err(e) => return Err(Error::storage(format!("read metadata {}", id), e)),
        };
        let meta: ArtifactMetadata = match serde_json::from_slice(&meta) {
            Ok(meta) => meta,
            Err(_) => {
                self.drop_corrupt(id, "unreadable metadata").await;
                return Ok(None);
            }
        };

        let payload = match fs::read(self.payload_path(id)).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.drop_corrupt(id, "payload missing").await;
                return Ok(None);
            }
            Err(e) => return Err(Error::storage(format!("read payload {}", id), e)),
        };

        let entry = ArtifactEntry::with_metadata(payload, meta);
        if entry.id() != id || !entry.verify_integrity() {
            self.drop_corrupt(id, "checksum mismatch").await;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Remove an entry. Returns whether it existed.
    pub async fn delete(&self, id: &ArtifactId) -> Result<bool> {
        let existed = self.index_remove(id);
        let meta = remove_if_exists(&self.meta_path(id)).await;
        let payload = remove_if_exists(&self.payload_path(id)).await;

        match (meta, payload) {
            (Ok(m), Ok(p)) => Ok(existed || m || p),
            (Err(e), _) | (_, Err(e)) => Err(Error::storage(format!("delete artifact {}", id), e)),
        }
    }

    /// Check if the tier holds an id
    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.index.contains_key(id)
    }

    /// Ids currently on disk
    pub fn list_ids(&self) -> Vec<ArtifactId> {
        self.index.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Payload bytes on disk
    pub fn total_size(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }
}

fn stem_id(path: &Path) -> Option<ArtifactId> {
    let stem = path.file_stem()?.to_str()?;
    ArtifactId::parse(stem).ok()
}

async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CastOptions, ContentKind, ContentSource};
    use assert_matches::assert_matches;

    fn make_entry(name: &str, payload: &'static [u8]) -> ArtifactEntry {
        let source = ContentSource::parse(ContentKind::Image, name).unwrap();
        let options = CastOptions::parse(ContentKind::Image, &serde_json::Value::Null).unwrap();
        let id = ArtifactId::compute(ContentKind::Image, &source, &options);
        ArtifactEntry::new(id, ContentKind::Image, Bytes::from_static(payload), "image/png")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).await.unwrap();
        let entry = make_entry("a.png", b"pixels");

        tier.put(&entry).await.unwrap();
        assert!(tier.contains(entry.id()));
        assert_eq!(tier.total_size(), 6);

        let loaded = tier.get(entry.id()).await.unwrap().unwrap();
        assert_eq!(loaded.payload(), entry.payload());
        assert_eq!(loaded.metadata, entry.metadata);
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).await.unwrap();
        let entry = make_entry("a.png", b"pixels");
        assert!(tier.get(entry.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_updates_size() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).await.unwrap();
        let first = make_entry("a.png", b"0123456789");
        let second = ArtifactEntry::new(
            first.id().clone(),
            ContentKind::Image,
            Bytes::from_static(b"abc"),
            "image/png",
        );

        tier.put(&first).await.unwrap();
        tier.put(&second).await.unwrap();
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.total_size(), 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).await.unwrap();
        let entry = make_entry("a.png", b"pixels");

        tier.put(&entry).await.unwrap();
        assert!(tier.delete(entry.id()).await.unwrap());
        assert!(!tier.delete(entry.id()).await.unwrap());
        assert!(tier.get(entry.id()).await.unwrap().is_none());
        assert_eq!(tier.total_size(), 0);
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_entry("a.png", b"aaaa");
        let b = make_entry("b.png", b"bb");
        {
            let tier = DiskTier::open(dir.path()).await.unwrap();
            tier.put(&a).await.unwrap();
            tier.put(&b).await.unwrap();
        }

        let tier = DiskTier::open(dir.path()).await.unwrap();
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.total_size(), 6);
        assert_eq!(tier.get(a.id()).await.unwrap().unwrap().payload(), a.payload());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).await.unwrap();
        let entry = make_entry("a.png", b"pixels");
        tier.put(&entry).await.unwrap();

        // Same length, different bytes
        std::fs::write(tier.payload_path(entry.id()), b"PIXELS").unwrap();

        assert!(tier.get(entry.id()).await.unwrap().is_none());
        assert!(!tier.contains(entry.id()));
        assert!(!tier.meta_path(entry.id()).exists());
        assert!(!tier.payload_path(entry.id()).exists());
    }

    #[tokio::test]
    async fn test_scan_removes_debris() {
        let dir = tempfile::tempdir().unwrap();
        let entry = make_entry("a.png", b"pixels");
        let orphan = make_entry("b.png", b"orphan");
        {
            let tier = DiskTier::open(dir.path()).await.unwrap();
            tier.put(&entry).await.unwrap();
        }
        let leftover = dir.path().join("whatever.bin.1234.tmp");
        let orphan_payload = dir.path().join(format!("{}.bin", orphan.id()));
        std::fs::write(&leftover, b"partial").unwrap();
        std::fs::write(&orphan_payload, b"orphan").unwrap();

        let tier = DiskTier::open(dir.path()).await.unwrap();
        assert_eq!(tier.len(), 1);
        assert!(!leftover.exists());
        assert!(!orphan_payload.exists());
    }

    #[tokio::test]
    async fn test_scan_drops_truncated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let entry = make_entry("a.png", b"pixels");
        {
            let tier = DiskTier::open(dir.path()).await.unwrap();
            tier.put(&entry).await.unwrap();
        }
        std::fs::write(dir.path().join(format!("{}.bin", entry.id())), b"pix").unwrap();

        let tier = DiskTier::open(dir.path()).await.unwrap();
        assert!(tier.is_empty());
        assert_eq!(tier.total_size(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let result = DiskTier::open(file.join("cache")).await;
        assert_matches!(result, Err(Error::Config(_)));
    }
}
