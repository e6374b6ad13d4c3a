//! Tool-call surface
//!
//! Request and response records for the caster's externally callable
//! operations. Transports (JSON-RPC, HTTP) deserialize into these and call
//! [`CastService`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::cache::{ArtifactId, CacheStats, ContentCache, Resolution};
use crate::cast::{CastSession, ControlAction, Dispatcher, PlaybackState, RendererSet, SessionState};
use crate::domain::{CastOptions, ContentKind, ContentSource};
use crate::error::Result;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CastContentRequest {
    pub display_id: String,
    pub content_type: String,
    pub source: String,
    #[serde(default)]
    pub options: Value,
    /// Give up waiting for the artifact after this many milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheContentRequest {
    pub content_type: String,
    pub source: String,
    #[serde(default)]
    pub options: Value,
    pub payload: Vec<u8>,
    /// Defaults to the content type's usual mime type
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ControlCastRequest {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub action: ControlAction,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CastContentResponse {
    pub session_id: Uuid,
    pub artifact_id: ArtifactId,
    pub mime_type: String,
    pub state: SessionState,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheContentResponse {
    pub artifact_id: ArtifactId,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CastStatusResponse {
    pub session_id: Uuid,
    pub display_id: String,
    pub content_type: ContentKind,
    pub state: SessionState,
    pub artifact_id: Option<ArtifactId>,
    pub mime_type: Option<String>,
    pub playback: PlaybackState,
    pub last_error: Option<String>,
}

impl From<CastSession> for CastStatusResponse {
    fn from(session: CastSession) -> Self {
        Self {
            session_id: session.session_id,
            display_id: session.display_id,
            content_type: session.content_type,
            state: session.state,
            artifact_id: session.artifact_id,
            mime_type: session.mime_type,
            playback: session.playback,
            last_error: session.last_error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<CastStatusResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearCacheResponse {
    /// Artifacts removed
    pub cleared: u64,
}

// =============================================================================
// Service
// =============================================================================

/// Entry point for every tool call
pub struct CastService {
    dispatcher: Dispatcher,
}

impl CastService {
    pub fn new(cache: Arc<ContentCache>, renderers: RendererSet) -> Self {
        Self {
            dispatcher: Dispatcher::new(cache, renderers),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        self.dispatcher.cache()
    }

    /// Cast content to a display
    pub async fn cast_content(&self, request: CastContentRequest) -> Result<CastContentResponse> {
        let kind: ContentKind = request.content_type.parse()?;

        let outcome = match request.deadline_ms {
            Some(ms) => {
                self.dispatcher
                    .cast_with_deadline(
                        &request.display_id,
                        kind,
                        &request.source,
                        &request.options,
                        Duration::from_millis(ms),
                    )
                    .await?
            }
            None => {
                self.dispatcher
                    .cast(&request.display_id, kind, &request.source, &request.options)
                    .await?
            }
        };

        Ok(CastContentResponse {
            session_id: outcome.session.session_id,
            artifact_id: outcome.artifact.id().clone(),
            mime_type: outcome.artifact.mime_type().to_string(),
            state: outcome.session.state,
            resolution: outcome.resolution,
        })
    }

    /// Admit caller-supplied bytes to the cache
    pub async fn cache_content(&self, request: CacheContentRequest) -> Result<CacheContentResponse> {
        let kind: ContentKind = request.content_type.parse()?;
        let source = ContentSource::parse(kind, &request.source)?;
        let options = CastOptions::parse(kind, &request.options)?;
        let mime_type = request
            .mime_type
            .unwrap_or_else(|| kind.default_mime().to_string());
        let size_bytes = request.payload.len() as u64;

        let artifact_id = self
            .cache()
            .store(kind, &source, &options, request.payload, mime_type)
            .await?;

        info!(artifact_id = %artifact_id, content_type = %kind, size_bytes, "Content cached");
        Ok(CacheContentResponse {
            artifact_id,
            size_bytes,
        })
    }

    pub fn get_cast_status(&self, request: SessionRequest) -> Result<CastStatusResponse> {
        self.dispatcher
            .status(request.session_id)
            .map(CastStatusResponse::from)
    }

    pub fn stop_cast(&self, request: SessionRequest) -> Result<CastStatusResponse> {
        self.dispatcher
            .stop(request.session_id)
            .map(CastStatusResponse::from)
    }

    pub fn confirm_playback(&self, request: SessionRequest) -> Result<CastStatusResponse> {
        self.dispatcher
            .confirm_playback(request.session_id)
            .map(CastStatusResponse::from)
    }

    pub fn control_cast(&self, request: ControlCastRequest) -> Result<CastStatusResponse> {
        self.dispatcher
            .control(request.session_id, request.action)
            .map(CastStatusResponse::from)
    }

    pub fn list_sessions(&self) -> ListSessionsResponse {
        ListSessionsResponse {
            sessions: self
                .dispatcher
                .sessions()
                .list()
                .into_iter()
                .map(CastStatusResponse::from)
                .collect(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub async fn clear_cache(&self) -> Result<ClearCacheResponse> {
        let cleared = self.cache().clear().await?;
        info!(cleared, "Cache cleared");
        Ok(ClearCacheResponse { cleared })
    }
}

// =============================================================================
// Tests
// =============================================================================
