//! Content Dispatcher
//!
//! Turns a cast request into a cached artifact and a session update:
//!
//! 1. Parse source and options (no session is touched on failure)
//! 2. Move the display's session to `Loading`
//! 3. Resolve the artifact: `cache://` ids directly, everything else through
//!    the single-flight path with the registered renderer
//! 4. Record the artifact on the session, or mark the session `Failed`

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::renderer::RendererSet;
use super::session::{CastSession, ControlAction, SessionRegistry};
use crate::cache::{ArtifactEntry, ArtifactId, ContentCache, Resolution};
use crate::domain::{CastOptions, ContentKind, ContentSource};
use crate::error::{Error, Result};

/// Result of a successful cast
#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub session: CastSession,
    pub artifact: ArtifactEntry,
    pub resolution: Resolution,
}

/// Routes cast requests to renderers through the cache
pub struct Dispatcher {
    cache: Arc<ContentCache>,
    renderers: RendererSet,
    sessions: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(cache: Arc<ContentCache>, renderers: RendererSet) -> Self {
        Self {
            cache,
            renderers,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn renderers(&self) -> &RendererSet {
        &self.renderers
    }

    /// Cast content to a display
    #[instrument(skip(self, raw_options))]
    pub async fn cast(
        &self,
        display_id: &str,
        content_type: ContentKind,
        source: &str,
        raw_options: &Value,
    ) -> Result<CastOutcome> {
        self.run_cast(display_id, content_type, source, raw_options, None)
            .await
    }

    /// Cast content, giving up on the artifact after `deadline`.
    ///
    /// A production that outlives the deadline keeps running and is cached
    /// when it completes.
    #[instrument(skip(self, raw_options))]
    pub async fn cast_with_deadline(
        &self,
        display_id: &str,
        content_type: ContentKind,
        source: &str,
        raw_options: &Value,
        deadline: Duration,
    ) -> Result<CastOutcome> {
        self.run_cast(display_id, content_type, source, raw_options, Some(deadline))
            .await
    }

    async fn run_cast(
        &self,
        display_id: &str,
        content_type: ContentKind,
        source: &str,
        raw_options: &Value,
        deadline: Option<Duration>,
    ) -> Result<CastOutcome> {
        let source = ContentSource::parse(content_type, source)?;
        let options = CastOptions::parse(content_type, raw_options)?;

        let session = self.sessions.begin_cast(display_id, content_type);

        match self.resolve(content_type, &source, &options, deadline).await {
            Ok((artifact, resolution)) => {
                let session = self.sessions.complete_load(
                    session.session_id,
                    session.revision,
                    artifact.id().clone(),
                    artifact.mime_type(),
                )?;
                info!(
                    session_id = %session.session_id,
                    artifact_id = %artifact.id(),
                    resolution = %resolution,
                    size = artifact.size(),
                    "Artifact ready"
                );
                Ok(CastOutcome {
                    session,
                    artifact,
                    resolution,
                })
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Cast failed");
                self.sessions
                    .fail(session.session_id, session.revision, &e);
                Err(e)
            }
        }
    }

    async fn resolve(
        &self,
        kind: ContentKind,
        source: &ContentSource,
        options: &CastOptions,
        deadline: Option<Duration>,
    ) -> Result<(ArtifactEntry, Resolution)> {
        if let ContentSource::Cache { key } = source {
            return self.resolve_cached(kind, key).await;
        }

        let renderer = self.renderers.get(kind);
        let render_source = source.clone();
        let render_options = options.clone();
        let produce = move || async move {
            let renderer = renderer.ok_or_else(|| Error::RenderFailed {
                content_type: kind.to_string(),
                cause: "no renderer registered".to_string(),
            })?;
            renderer
                .render(&render_source, &render_options)
                .await
                .map_err(|e| Error::RenderFailed {
                    content_type: kind.to_string(),
                    cause: format!("{:#}", e),
                })
        };

        let work = self.cache.get_or_produce(kind, source, options, produce);
        match deadline {
            None => work.await,
            Some(after) => tokio::time::timeout(after, work)
                .await
                .map_err(|_| Error::DeadlineExceeded {
                    content_type: kind.to_string(),
                    after,
                })?,
        }
    }

    async fn resolve_cached(
        &self,
        kind: ContentKind,
        key: &str,
    ) -> Result<(ArtifactEntry, Resolution)> {
        let id = ArtifactId::parse(key)?;
        let (entry, resolution) = self
            .cache
            .lookup(&id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {}", id)))?;

        if entry.content_type() != kind {
            return Err(Error::invalid_option(kind.as_str(), "content_type"));
        }
        Ok((entry, resolution))
    }

    /// The display reports playback started
    pub fn confirm_playback(&self, session_id: Uuid) -> Result<CastSession> {
        self.sessions.confirm_playback(session_id)
    }

    /// Apply a playback control
    pub fn control(&self, session_id: Uuid, action: ControlAction) -> Result<CastSession> {
        self.sessions.control(session_id, action)
    }

    /// Stop a session from any state
    pub fn stop(&self, session_id: Uuid) -> Result<CastSession> {
        self.sessions.stop(session_id)
    }

    pub fn status(&self, session_id: Uuid) -> Result<CastSession> {
        self.sessions.get(session_id)
    }
}

// =============================================================================
// Tests
// =============================================================================
