//! Cache Entry Types
//!
//! Artifact identity, persisted metadata, and the entry handed to callers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{CastOptions, ContentKind, ContentSource};
use crate::error::{Error, Result};

/// Length of a hex-encoded SHA-256 digest
const ID_LEN: usize = 64;

/// Artifact identity - hex SHA-256 over (content type, source, options)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Derive the identity of an artifact.
    ///
    /// Inputs are joined with newlines; neither the kind name nor the
    /// canonical options can contain one, so the encoding is unambiguous.
    pub fn compute(kind: ContentKind, source: &ContentSource, options: &CastOptions) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(source.normalized().as_bytes());
        hasher.update(b"\n");
        hasher.update(options.canonical().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse an id received from a caller
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let valid = raw.len() == ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::NotFound(format!("artifact {}", raw)))
        }
    }

    /// Hex form
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex SHA-256 of a payload
pub(crate) fn payload_checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Output of a renderer or fetcher, before it has an identity
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub payload: Bytes,
    pub mime_type: String,
}

impl RenderOutput {
    pub fn new(payload: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Metadata for a cached artifact; this is also the persisted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub id: ArtifactId,
    pub content_type: ContentKind,
    pub mime_type: String,
    /// Fixed at creation
    pub size_bytes: u64,
    /// Hex SHA-256 of the payload
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// A cached artifact: metadata plus a shared read-only payload
#[derive(Clone)]
pub struct ArtifactEntry {
    pub metadata: ArtifactMetadata,
    payload: Bytes,
}

impl ArtifactEntry {
    /// Create a new entry, fixing its size and checksum
    pub fn new(
        id: ArtifactId,
        content_type: ContentKind,
        payload: Bytes,
        mime_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            metadata: ArtifactMetadata {
                id,
                content_type,
                mime_type: mime_type.into(),
                size_bytes: payload.len() as u64,
                checksum: payload_checksum(&payload),
                created_at: now,
                last_accessed_at: now,
            },
            payload,
        }
    }

    /// Rebuild an entry from persisted metadata (for tier transfers)
    pub fn with_metadata(payload: Bytes, metadata: ArtifactMetadata) -> Self {
        Self { metadata, payload }
    }

    #[inline]
    pub fn id(&self) -> &ArtifactId {
        &self.metadata.id
    }

    #[inline]
    pub fn content_type(&self) -> ContentKind {
        self.metadata.content_type
    }

    #[inline]
    pub fn mime_type(&self) -> &str {
        &self.metadata.mime_type
    }

    /// Payload view (zero-copy)
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.metadata.size_bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.metadata.last_accessed_at
    }

    /// Record an access
    pub fn touch(&mut self) {
        self.metadata.last_accessed_at = Utc::now();
    }

    /// Verify payload length and checksum against the metadata
    pub fn verify_integrity(&self) -> bool {
        self.payload.len() as u64 == self.metadata.size_bytes
            && payload_checksum(&self.payload) == self.metadata.checksum
    }
}

impl std::fmt::Debug for ArtifactEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactEntry")
            .field("id", &self.metadata.id)
            .field("content_type", &self.metadata.content_type)
            .field("mime_type", &self.metadata.mime_type)
            .field("size", &self.metadata.size_bytes)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
