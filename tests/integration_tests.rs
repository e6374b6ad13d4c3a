//! Caster Core Integration Tests
//!
//! - Content cache: capacity, LRU order, durability, identity
//! - Cast dispatch: single-flight across sessions, option validation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::{json, Value};

use caster_core::cache::Resolution;
use caster_core::{
    CastOptions, ContentCache, ContentKind, ContentSource, Error, RenderOutput, Renderer,
    RendererSet,
};

fn source(kind: ContentKind, raw: &str) -> ContentSource {
    ContentSource::parse(kind, raw).unwrap()
}

fn options(kind: ContentKind, raw: Value) -> CastOptions {
    CastOptions::parse(kind, &raw).unwrap()
}

// =============================================================================
// Content Cache
// =============================================================================

mod cache_tests {
    use super::*;

    async fn store_image(cache: &ContentCache, name: &str, size: usize) -> caster_core::ArtifactId {
        cache
            .store(
                ContentKind::Image,
                &source(ContentKind::Image, name),
                &options(ContentKind::Image, Value::Null),
                vec![7u8; size],
                "image/png",
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::with_capacity(dir.path(), 500).await.unwrap();

        let a = store_image(&cache, "a.png", 300).await;
        let b = store_image(&cache, "b.png", 150).await;
        assert_eq!(cache.stats().memory_item_count, 2);

        let c = store_image(&cache, "c.png", 100).await;
        let stats = cache.stats();
        assert_eq!(stats.memory_item_count, 2);
        assert!(stats.memory_size_bytes <= 500);
        assert_eq!(stats.disk_item_count, 3);

        assert!(!cache.is_resident(&a));
        assert!(cache.is_resident(&b));
        assert!(cache.is_resident(&c));
        assert!(cache.contains(&a));

        let (entry, resolution) = cache.lookup(&a).await.unwrap().unwrap();
        assert_eq!(resolution, Resolution::Disk);
        assert_eq!(entry.size(), 300);
        assert_eq!(entry.payload().as_ref(), vec![7u8; 300].as_slice());
        assert_eq!(entry.mime_type(), "image/png");
    }

    #[tokio::test]
    async fn test_recently_read_entry_outlives_older_one() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::with_capacity(dir.path(), 500).await.unwrap();

        let a = store_image(&cache, "a.png", 150).await;
        let b = store_image(&cache, "b.png", 150).await;
        let c = store_image(&cache, "c.png", 150).await;

        cache.get(&a).await.unwrap();
        let d = store_image(&cache, "d.png", 150).await;

        assert!(cache.is_resident(&a));
        assert!(!cache.is_resident(&b));
        assert!(cache.is_resident(&c));
        assert!(cache.is_resident(&d));
    }

    #[tokio::test]
    async fn test_document_round_trip_keeps_mime() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::with_capacity(dir.path(), 1 << 20).await.unwrap();
        let payload = b"%PDF-1.7 page five".to_vec();

        let id = cache
            .store(
                ContentKind::Document,
                &source(ContentKind::Document, "/docs/report.pdf"),
                &options(ContentKind::Document, json!({"page": 5})),
                payload.clone(),
                "application/pdf",
            )
            .await
            .unwrap();

        let entry = cache.get(&id).await.unwrap();
        assert_eq!(entry.mime_type(), "application/pdf");
        assert_eq!(entry.size(), payload.len() as u64);
        assert_eq!(entry.payload().as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn test_artifacts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![42u8; 2048];

        let id = {
            let cache = ContentCache::with_capacity(dir.path(), 1 << 20).await.unwrap();
            cache
                .store(
                    ContentKind::Video,
                    &source(ContentKind::Video, "https://example.com/clip.mov"),
                    &options(ContentKind::Video, json!({"codec": "h264"})),
                    payload.clone(),
                    "video/mp4",
                )
                .await
                .unwrap()
        };

        let reopened = ContentCache::with_capacity(dir.path(), 1 << 20).await.unwrap();
        assert_eq!(reopened.stats().disk_item_count, 1);
        assert_eq!(reopened.stats().memory_item_count, 0);

        let (entry, resolution) = reopened.lookup(&id).await.unwrap().unwrap();
        assert_eq!(resolution, Resolution::Disk);
        assert_eq!(entry.mime_type(), "video/mp4");
        assert_eq!(entry.payload().as_ref(), payload.as_slice());
        assert!(reopened.is_resident(&id));
    }

    #[tokio::test]
    async fn test_same_identity_keeps_latest_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::with_capacity(dir.path(), 1 << 20).await.unwrap();
        let kind = ContentKind::Markdown;
        let opts = options(kind, json!({"theme": "light"}));

        let first = cache
            .store(kind, &source(kind, "notes.md"), &opts, b"<p>one</p>".to_vec(), "text/html")
            .await
            .unwrap();
        let second = cache
            .store(kind, &source(kind, "notes.md"), &opts, b"<p>two</p>".to_vec(), "text/html")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.stats().disk_item_count, 1);
        assert_eq!(cache.stats().memory_item_count, 1);
        assert_eq!(cache.get(&first).await.unwrap().payload().as_ref(), b"<p>two</p>");
    }

    #[tokio::test]
    async fn test_removed_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::with_capacity(dir.path(), 1 << 20).await.unwrap();

        let id = store_image(&cache, "gone.png", 64).await;
        cache.remove(&id).await.unwrap();

        assert_matches!(cache.get(&id).await, Err(Error::NotFound(_)));
        assert_matches!(cache.remove(&id).await, Err(Error::NotFound(_)));
    }
}

// =============================================================================
// Cast Dispatch
// =============================================================================

mod cast_tests {
    use super::*;
    use caster_core::tools::{CastContentRequest, SessionRequest};
    use caster_core::{CastService, SessionState};

    struct SlowMirror {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for SlowMirror {
        async fn render(
            &self,
            _source: &ContentSource,
            options: &CastOptions,
        ) -> anyhow::Result<RenderOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(RenderOutput::new(format!("{:?}", options).into_bytes(), "image/png"))
        }
    }

    async fn service(renderers: RendererSet) -> (tempfile::TempDir, CastService) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::with_capacity(dir.path(), 1 << 20).await.unwrap();
        (dir, CastService::new(Arc::new(cache), renderers))
    }

    fn cast_request(display: &str, content_type: &str, source: &str, options: Value) -> CastContentRequest {
        serde_json::from_value(json!({
            "display_id": display,
            "content_type": content_type,
            "source": source,
            "options": options,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_mirror_casts_render_once() {
        let mirror = Arc::new(SlowMirror {
            calls: AtomicUsize::new(0),
        });
        let renderers = RendererSet::new().with(ContentKind::ScreenMirror, mirror.clone());
        let (_dir, service) = service(renderers).await;

        let quality = json!({"quality": "ultra"});
        let (left, right) = tokio::join!(
            service.cast_content(cast_request("left-wall", "screen_mirror", "desktop-1", quality.clone())),
            service.cast_content(cast_request("right-wall", "screen_mirror", "desktop-1", quality)),
        );
        let left = left.unwrap();
        let right = right.unwrap();

        assert_eq!(mirror.calls.load(Ordering::SeqCst), 1);
        assert_eq!(left.artifact_id, right.artifact_id);
        assert_ne!(left.session_id, right.session_id);

        for session_id in [left.session_id, right.session_id] {
            let status = service.get_cast_status(SessionRequest { session_id }).unwrap();
            assert_eq!(status.state, SessionState::Loading);
            assert_eq!(status.artifact_id.as_ref(), Some(&left.artifact_id));
        }

        // A later cast of the same identity is a cache hit
        let again = service
            .cast_content(cast_request("lobby", "screen_mirror", "desktop-1", json!({"quality": "ultra"})))
            .await
            .unwrap();
        assert_eq!(again.resolution, Resolution::Memory);
        assert_eq!(mirror.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_audio_without_codec_is_rejected() {
        let (_dir, service) = service(RendererSet::new()).await;

        let result = service
            .cast_content(cast_request("kitchen", "audio", "song.flac", json!({"format": "flac"})))
            .await;

        assert_matches!(
            result,
            Err(Error::InvalidOptions { content_type, fields })
                if content_type == "audio" && fields == vec!["codec"]
        );
        assert!(service.list_sessions().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_error_names_content_type() {
        let (_dir, service) = service(RendererSet::new()).await;

        let result = service
            .cast_content(cast_request("kitchen", "audio", "  ", json!({"codec": "aac"})))
            .await;

        assert_matches!(
            result,
            Err(Error::InvalidOptions { content_type, fields })
                if content_type == "audio" && fields == vec!["source"]
        );
        assert!(service.list_sessions().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_render_marks_session_failed() {
        let (_dir, service) = service(RendererSet::new()).await;

        let result = service
            .cast_content(cast_request("den", "model3d", "teapot.glb", Value::Null))
            .await;
        assert_matches!(result, Err(Error::RenderFailed { .. }));

        let sessions = service.list_sessions().sessions;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].state, SessionState::Failed);
        assert!(sessions[0].last_error.is_some());
        assert_eq!(service.cache_stats().disk_item_count, 0);
    }
}
