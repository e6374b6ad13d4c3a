//! Renderer collaborators
//!
//! A renderer turns a content source plus parsed options into artifact bytes.
//! Renderers live outside this crate; the dispatcher only sees this trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::RenderOutput;
use crate::domain::{CastOptions, ContentKind, ContentSource};

/// Produces an artifact for one content type
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `source` with `options`. Errors carry their own context chain.
    async fn render(
        &self,
        source: &ContentSource,
        options: &CastOptions,
    ) -> anyhow::Result<RenderOutput>;
}

/// One optional renderer per content type
#[derive(Clone, Default)]
pub struct RendererSet {
    markdown: Option<Arc<dyn Renderer>>,
    video: Option<Arc<dyn Renderer>>,
    image: Option<Arc<dyn Renderer>>,
    audio: Option<Arc<dyn Renderer>>,
    document: Option<Arc<dyn Renderer>>,
    screen_mirror: Option<Arc<dyn Renderer>>,
    executable_module: Option<Arc<dyn Renderer>>,
    model3d: Option<Arc<dyn Renderer>>,
    stream: Option<Arc<dyn Renderer>>,
    presentation: Option<Arc<dyn Renderer>>,
}

impl RendererSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `renderer` for `kind`, replacing any previous one
    pub fn with(mut self, kind: ContentKind, renderer: Arc<dyn Renderer>) -> Self {
        *self.slot_mut(kind) = Some(renderer);
        self
    }

    /// Renderer registered for `kind`
    pub fn get(&self, kind: ContentKind) -> Option<Arc<dyn Renderer>> {
        let slot = match kind {
            ContentKind::Markdown => &self.markdown,
            ContentKind::Video => &self.video,
            ContentKind::Image => &self.image,
            ContentKind::Audio => &self.audio,
            ContentKind::Document => &self.document,
            ContentKind::ScreenMirror => &self.screen_mirror,
            ContentKind::ExecutableModule => &self.executable_module,
            ContentKind::Model3D => &self.model3d,
            ContentKind::Stream => &self.stream,
            ContentKind::Presentation => &self.presentation,
        };
        slot.clone()
    }

    fn slot_mut(&mut self, kind: ContentKind) -> &mut Option<Arc<dyn Renderer>> {
        match kind {
            ContentKind::Markdown => &mut self.markdown,
            ContentKind::Video => &mut self.video,
            ContentKind::Image => &mut self.image,
            ContentKind::Audio => &mut self.audio,
            ContentKind::Document => &mut self.document,
            ContentKind::ScreenMirror => &mut self.screen_mirror,
            ContentKind::ExecutableModule => &mut self.executable_module,
            ContentKind::Model3D => &mut self.model3d,
            ContentKind::Stream => &mut self.stream,
            ContentKind::Presentation => &mut self.presentation,
        }
    }

    /// Content types that have a renderer
    pub fn registered(&self) -> Vec<ContentKind> {
        ContentKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_some())
            .collect()
    }
}

impl std::fmt::Debug for RendererSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererSet")
            .field("registered", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl Renderer for Fixed {
        async fn render(
            &self,
            _source: &ContentSource,
            _options: &CastOptions,
        ) -> anyhow::Result<RenderOutput> {
            Ok(RenderOutput::new(self.0.as_bytes().to_vec(), "text/plain"))
        }
    }

    #[test]
    fn test_empty_set() {
        let set = RendererSet::new();
        for kind in ContentKind::ALL {
            assert!(set.get(kind).is_none());
        }
        assert!(set.registered().is_empty());
    }

    #[test]
    fn test_registration_is_per_kind() {
        let set = RendererSet::new()
            .with(ContentKind::Document, Arc::new(Fixed("pdf")))
            .with(ContentKind::Model3D, Arc::new(Fixed("glb")));

        assert!(set.get(ContentKind::Document).is_some());
        assert!(set.get(ContentKind::Video).is_none());
        assert_eq!(
            set.registered(),
            vec![ContentKind::Document, ContentKind::Model3D]
        );
    }

    #[tokio::test]
    async fn test_registered_renderer_is_called() {
        let set = RendererSet::new().with(ContentKind::Markdown, Arc::new(Fixed("<h1>hi</h1>")));
        let renderer = set.get(ContentKind::Markdown).unwrap();
        let source = ContentSource::parse(ContentKind::Markdown, "notes.md").unwrap();
        let options = CastOptions::parse(ContentKind::Markdown, &serde_json::Value::Null).unwrap();

        let output = renderer.render(&source, &options).await.unwrap();
        assert_eq!(output.payload.as_ref(), b"<h1>hi</h1>");
    }
}
