//! Cast sessions
//!
//! One session per display. A session records which artifact the display is
//! showing and where playback stands.
//!
//! ```text
//! Idle ──▶ Loading ──▶ Playing ◀──▶ Paused
//!             ▲           │            │
//!             └───────────┴── recast ──┘
//!
//! any non-Stopped ──▶ Failed
//! any non-Stopped ──▶ Stopped (session removed)
//! ```

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::ArtifactId;
use crate::domain::ContentKind;
use crate::error::{Error, Result};

/// Playback state of a cast session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, nothing requested yet
    Idle,
    /// Artifact resolved or resolving; waiting for the display to start
    Loading,
    /// Display confirmed playback
    Playing,
    Paused,
    /// Torn down
    Stopped,
    /// A collaborator failed unrecoverably
    Failed,
}

impl SessionState {
    /// Check whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Failed, _) => false,
            (_, Failed) => true,
            (Idle, Loading) => true,
            (Loading | Playing | Paused, Loading) => true,
            (Loading, Playing) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            _ => false,
        }
    }

    /// Check whether playback controls apply
    pub fn is_controllable(&self) -> bool {
        matches!(self, SessionState::Playing | SessionState::Paused)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Loading => write!(f, "Loading"),
            SessionState::Playing => write!(f, "Playing"),
            SessionState::Paused => write!(f, "Paused"),
            SessionState::Stopped => write!(f, "Stopped"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Position and volume as last reported or requested
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub position_secs: f64,
    /// 0.0 - 1.0
    pub volume: f32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position_secs: 0.0,
            volume: 1.0,
        }
    }
}

/// Playback control request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    Pause,
    Resume,
    Seek { position_secs: f64 },
    Volume { level: f32 },
    Stop,
}

impl ControlAction {
    fn name(&self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Seek { .. } => "seek",
            ControlAction::Volume { .. } => "volume",
            ControlAction::Stop => "stop",
        }
    }
}

/// One content-to-display assignment
#[derive(Debug, Clone, Serialize)]
pub struct CastSession {
    pub session_id: Uuid,
    pub display_id: String,
    pub content_type: ContentKind,
    /// None until the first successful resolution
    pub artifact_id: Option<ArtifactId>,
    pub mime_type: Option<String>,
    pub state: SessionState,
    pub playback: PlaybackState,
    pub last_error: Option<String>,
    /// Bumped on every cast so a slow, superseded resolution cannot
    /// overwrite a newer one
    #[serde(skip)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CastSession {
    fn new(display_id: &str, content_type: ContentKind) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            display_id: display_id.to_string(),
            content_type,
            artifact_id: None,
            mime_type: None,
            state: SessionState::Idle,
            playback: PlaybackState::default(),
            last_error: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: SessionState, operation: &str) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(self.rejected(operation));
        }
        debug!(
            session_id = %self.session_id,
            from = %self.state,
            to = %next,
            operation,
            "Session transition"
        );
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn rejected(&self, operation: &str) -> Error {
        Error::InvalidSessionState {
            session_id: self.session_id.to_string(),
            state: self.state.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Start (re)loading new content
    fn begin_load(&mut self, content_type: ContentKind) -> Result<()> {
        self.transition(SessionState::Loading, "cast")?;
        self.content_type = content_type;
        self.artifact_id = None;
        self.mime_type = None;
        self.last_error = None;
        self.playback = PlaybackState {
            volume: self.playback.volume,
            ..Default::default()
        };
        self.revision += 1;
        Ok(())
    }

    fn apply(&mut self, action: ControlAction) -> Result<()> {
        if !self.state.is_controllable() {
            return Err(self.rejected(action.name()));
        }

        match action {
            ControlAction::Pause => {
                if self.state == SessionState::Playing {
                    self.transition(SessionState::Paused, "pause")?;
                }
            }
            ControlAction::Resume => {
                if self.state == SessionState::Paused {
                    self.transition(SessionState::Playing, "resume")?;
                }
            }
            ControlAction::Seek { position_secs } => {
                if !position_secs.is_finite() || position_secs < 0.0 {
                    return Err(Error::invalid_option(
                        self.content_type.as_str(),
                        "position_secs",
                    ));
                }
                self.playback.position_secs = position_secs;
                self.updated_at = Utc::now();
            }
            ControlAction::Volume { level } => {
                if !(0.0..=1.0).contains(&level) {
                    return Err(Error::invalid_option(self.content_type.as_str(), "volume"));
                }
                self.playback.volume = level;
                self.updated_at = Utc::now();
            }
            ControlAction::Stop => self.transition(SessionState::Stopped, "stop")?,
        }
        Ok(())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Live sessions, indexed by id and by display.
///
/// Lock order is `by_display` then `sessions`; no path holds a `sessions`
/// guard while touching `by_display`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, CastSession>,
    by_display: DashMap<String, Uuid>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the display's session to `Loading` for new content, creating or
    /// replacing it as needed. Failed sessions are replaced, not revived.
    pub fn begin_cast(&self, display_id: &str, content_type: ContentKind) -> CastSession {
        match self.by_display.entry(display_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = *slot.get();
                if let Some(mut session) = self.sessions.get_mut(&current) {
                    if session.begin_load(content_type).is_ok() {
                        return session.clone();
                    }
                }
                self.sessions.remove(&current);

                let session = self.create(display_id, content_type);
                slot.insert(session.session_id);
                session
            }
            Entry::Vacant(slot) => {
                let session = self.create(display_id, content_type);
                slot.insert(session.session_id);
                session
            }
        }
    }

    fn create(&self, display_id: &str, content_type: ContentKind) -> CastSession {
        let mut session = CastSession::new(display_id, content_type);
        // Idle -> Loading is always legal
        let _ = session.begin_load(content_type);
        info!(
            session_id = %session.session_id,
            display_id,
            content_type = %content_type,
            "Cast session created"
        );
        self.sessions.insert(session.session_id, session.clone());
        session
    }

    /// Record the resolved artifact for the cast started at `revision`.
    /// A superseded revision leaves the session untouched.
    pub fn complete_load(
        &self,
        session_id: Uuid,
        revision: u64,
        artifact_id: ArtifactId,
        mime_type: &str,
    ) -> Result<CastSession> {
        let mut session = self.get_mut(session_id)?;
        if session.revision == revision && session.state == SessionState::Loading {
            session.artifact_id = Some(artifact_id);
            session.mime_type = Some(mime_type.to_string());
            session.updated_at = Utc::now();
        }
        Ok(session.clone())
    }

    /// Mark the cast started at `revision` as failed
    pub fn fail(&self, session_id: Uuid, revision: u64, error: &Error) -> Option<CastSession> {
        let mut session = self.sessions.get_mut(&session_id)?;
        if session.revision == revision && session.transition(SessionState::Failed, "fail").is_ok()
        {
            session.last_error = Some(error.to_string());
        }
        Some(session.clone())
    }

    /// The display reports that playback started
    pub fn confirm_playback(&self, session_id: Uuid) -> Result<CastSession> {
        let mut session = self.get_mut(session_id)?;
        if session.state != SessionState::Loading || session.artifact_id.is_none() {
            return Err(session.rejected("confirm_playback"));
        }
        session.transition(SessionState::Playing, "confirm_playback")?;
        Ok(session.clone())
    }

    /// Apply a playback control
    pub fn control(&self, session_id: Uuid, action: ControlAction) -> Result<CastSession> {
        if action == ControlAction::Stop {
            let session = self.get(session_id)?;
            if !session.state.is_controllable() {
                return Err(session.rejected("stop"));
            }
            return self.stop(session_id);
        }

        let mut session = self.get_mut(session_id)?;
        session.apply(action)?;
        Ok(session.clone())
    }

    /// Tear a session down from any state and remove it
    pub fn stop(&self, session_id: Uuid) -> Result<CastSession> {
        let (_, mut session) = self
            .sessions
            .remove(&session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        self.by_display
            .remove_if(&session.display_id, |_, id| *id == session_id);

        session.transition(SessionState::Stopped, "stop")?;
        info!(session_id = %session_id, display_id = %session.display_id, "Cast session stopped");
        Ok(session)
    }

    /// Stop whatever is showing on a display
    pub fn teardown_display(&self, display_id: &str) -> Option<CastSession> {
        let session_id = *self.by_display.get(display_id)?;
        self.stop(session_id).ok()
    }

    pub fn get(&self, session_id: Uuid) -> Result<CastSession> {
        self.sessions
            .get(&session_id)
            .map(|s| s.clone())
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    fn get_mut(
        &self,
        session_id: Uuid,
    ) -> Result<dashmap::mapref::one::RefMut<'_, Uuid, CastSession>> {
        self.sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    /// Session currently assigned to a display
    pub fn for_display(&self, display_id: &str) -> Option<CastSession> {
        let session_id = *self.by_display.get(display_id)?;
        self.get(session_id).ok()
    }

    /// All live sessions, oldest first
    pub fn list(&self) -> Vec<CastSession> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CastOptions, ContentSource};
    use assert_matches::assert_matches;

    fn artifact(name: &str) -> ArtifactId {
        let source = ContentSource::parse(ContentKind::Video, name).unwrap();
        let options = CastOptions::parse(ContentKind::Video, &serde_json::Value::Null).unwrap();
        ArtifactId::compute(ContentKind::Video, &source, &options)
    }

    fn playing(registry: &SessionRegistry, display: &str) -> CastSession {
        let session = registry.begin_cast(display, ContentKind::Video);
        registry
            .complete_load(session.session_id, session.revision, artifact("a.mp4"), "video/mp4")
            .unwrap();
        registry.confirm_playback(session.session_id).unwrap()
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Playing));
        assert!(Paused.can_transition_to(Loading));
        assert!(Failed.can_transition_to(Stopped));
        assert!(Idle.can_transition_to(Failed));

        assert!(!Idle.can_transition_to(Playing));
        assert!(!Failed.can_transition_to(Loading));
        assert!(!Failed.can_transition_to(Playing));
        assert!(!Stopped.can_transition_to(Loading));
        assert!(!Stopped.can_transition_to(Stopped));
    }

    #[test]
    fn test_cast_lifecycle() {
        let registry = SessionRegistry::new();
        let session = registry.begin_cast("tv-1", ContentKind::Video);
        assert_eq!(session.state, SessionState::Loading);
        assert!(session.artifact_id.is_none());

        let loaded = registry
            .complete_load(session.session_id, session.revision, artifact("a.mp4"), "video/mp4")
            .unwrap();
        assert_eq!(loaded.state, SessionState::Loading);
        assert_eq!(loaded.mime_type.as_deref(), Some("video/mp4"));

        let playing = registry.confirm_playback(session.session_id).unwrap();
        assert_eq!(playing.state, SessionState::Playing);
    }

    #[test]
    fn test_confirm_requires_artifact() {
        let registry = SessionRegistry::new();
        let session = registry.begin_cast("tv-1", ContentKind::Video);
        assert_matches!(
            registry.confirm_playback(session.session_id),
            Err(Error::InvalidSessionState { .. })
        );
    }

    #[test]
    fn test_recast_reuses_display_session() {
        let registry = SessionRegistry::new();
        let first = playing(&registry, "tv-1");
        let second = registry.begin_cast("tv-1", ContentKind::Image);

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.state, SessionState::Loading);
        assert_eq!(second.content_type, ContentKind::Image);
        assert!(second.revision > first.revision);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let registry = SessionRegistry::new();
        let first = registry.begin_cast("tv-1", ContentKind::Video);
        let second = registry.begin_cast("tv-1", ContentKind::Video);

        let after = registry
            .complete_load(first.session_id, first.revision, artifact("old.mp4"), "video/mp4")
            .unwrap();
        assert!(after.artifact_id.is_none());

        let after = registry
            .complete_load(second.session_id, second.revision, artifact("new.mp4"), "video/mp4")
            .unwrap();
        assert_eq!(after.artifact_id, Some(artifact("new.mp4")));
    }

    #[test]
    fn test_failed_session_is_replaced_on_recast() {
        let registry = SessionRegistry::new();
        let session = registry.begin_cast("tv-1", ContentKind::Document);
        let err = Error::RenderFailed {
            content_type: "document".into(),
            cause: "corrupt".into(),
        };
        let failed = registry.fail(session.session_id, session.revision, &err).unwrap();
        assert_eq!(failed.state, SessionState::Failed);
        assert!(failed.last_error.unwrap().contains("corrupt"));

        let fresh = registry.begin_cast("tv-1", ContentKind::Document);
        assert_ne!(fresh.session_id, session.session_id);
        assert_matches!(registry.get(session.session_id), Err(Error::NotFound(_)));
        assert_eq!(registry.for_display("tv-1").unwrap().session_id, fresh.session_id);
    }

    #[test]
    fn test_controls_require_playing_or_paused() {
        let registry = SessionRegistry::new();
        let loading = registry.begin_cast("tv-1", ContentKind::Video);
        assert_matches!(
            registry.control(loading.session_id, ControlAction::Pause),
            Err(Error::InvalidSessionState { operation, .. }) if operation == "pause"
        );
        assert_matches!(
            registry.control(loading.session_id, ControlAction::Stop),
            Err(Error::InvalidSessionState { .. })
        );
    }

    #[test]
    fn test_pause_resume_seek_volume() {
        let registry = SessionRegistry::new();
        let session = playing(&registry, "tv-1");
        let id = session.session_id;

        assert_eq!(registry.control(id, ControlAction::Pause).unwrap().state, SessionState::Paused);
        assert_eq!(registry.control(id, ControlAction::Pause).unwrap().state, SessionState::Paused);
        assert_eq!(registry.control(id, ControlAction::Resume).unwrap().state, SessionState::Playing);

        let seeked = registry
            .control(id, ControlAction::Seek { position_secs: 42.5 })
            .unwrap();
        assert_eq!(seeked.playback.position_secs, 42.5);

        let louder = registry.control(id, ControlAction::Volume { level: 0.3 }).unwrap();
        assert_eq!(louder.playback.volume, 0.3);

        assert_matches!(
            registry.control(id, ControlAction::Volume { level: 1.5 }),
            Err(Error::InvalidOptions { fields, .. }) if fields == vec!["volume"]
        );
        assert_matches!(
            registry.control(id, ControlAction::Seek { position_secs: -1.0 }),
            Err(Error::InvalidOptions { .. })
        );
    }

    #[test]
    fn test_stop_removes_session() {
        let registry = SessionRegistry::new();
        let session = playing(&registry, "tv-1");

        let stopped = registry.control(session.session_id, ControlAction::Stop).unwrap();
        assert_eq!(stopped.state, SessionState::Stopped);
        assert!(registry.is_empty());
        assert!(registry.for_display("tv-1").is_none());
        assert_matches!(registry.stop(session.session_id), Err(Error::NotFound(_)));
    }

    #[test]
    fn test_stop_from_loading_and_failed() {
        let registry = SessionRegistry::new();
        let loading = registry.begin_cast("tv-1", ContentKind::Video);
        assert_eq!(registry.stop(loading.session_id).unwrap().state, SessionState::Stopped);

        let session = registry.begin_cast("tv-2", ContentKind::Video);
        registry.fail(session.session_id, session.revision, &Error::Internal("x".into()));
        assert_eq!(registry.stop(session.session_id).unwrap().state, SessionState::Stopped);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_teardown_display_and_list() {
        let registry = SessionRegistry::new();
        registry.begin_cast("tv-1", ContentKind::Video);
        registry.begin_cast("tv-2", ContentKind::Audio);
        assert_eq!(registry.list().len(), 2);

        let stopped = registry.teardown_display("tv-1").unwrap();
        assert_eq!(stopped.display_id, "tv-1");
        assert_eq!(registry.list().len(), 1);
        assert!(registry.teardown_display("tv-1").is_none());
    }

    #[test]
    fn test_control_action_wire_format() {
        let action: ControlAction =
            serde_json::from_str(r#"{"action":"seek","position_secs":12.0}"#).unwrap();
        assert_eq!(action, ControlAction::Seek { position_secs: 12.0 });
        let action: ControlAction = serde_json::from_str(r#"{"action":"pause"}"#).unwrap();
        assert_eq!(action, ControlAction::Pause);
    }
}
