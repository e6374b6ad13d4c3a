//! Content kinds and sources

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Closed set of content types the caster understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "markdown")]
    Markdown,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "audio")]
    Audio,
    /// Paged document (PDF)
    #[serde(rename = "document")]
    Document,
    #[serde(rename = "screen_mirror")]
    ScreenMirror,
    /// WebAssembly module executed to produce output
    #[serde(rename = "executable_module")]
    ExecutableModule,
    #[serde(rename = "model3d")]
    Model3D,
    #[serde(rename = "stream")]
    Stream,
    #[serde(rename = "presentation")]
    Presentation,
}

impl ContentKind {
    /// Every content kind, in declaration order
    pub const ALL: [ContentKind; 10] = [
        ContentKind::Markdown,
        ContentKind::Video,
        ContentKind::Image,
        ContentKind::Audio,
        ContentKind::Document,
        ContentKind::ScreenMirror,
        ContentKind::ExecutableModule,
        ContentKind::Model3D,
        ContentKind::Stream,
        ContentKind::Presentation,
    ];

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Markdown => "markdown",
            ContentKind::Video => "video",
            ContentKind::Image => "image",
            ContentKind::Audio => "audio",
            ContentKind::Document => "document",
            ContentKind::ScreenMirror => "screen_mirror",
            ContentKind::ExecutableModule => "executable_module",
            ContentKind::Model3D => "model3d",
            ContentKind::Stream => "stream",
            ContentKind::Presentation => "presentation",
        }
    }

    /// Mime type assumed when a payload is admitted without one
    pub fn default_mime(&self) -> &'static str {
        match self {
            ContentKind::Markdown => "text/html",
            ContentKind::Video => "video/mp4",
            ContentKind::Image => "image/png",
            ContentKind::Audio => "audio/mpeg",
            ContentKind::Document => "application/pdf",
            ContentKind::ScreenMirror => "image/png",
            ContentKind::ExecutableModule => "application/wasm",
            ContentKind::Model3D => "model/gltf-binary",
            ContentKind::Stream => "application/vnd.apple.mpegurl",
            ContentKind::Presentation => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "markdown" => ContentKind::Markdown,
            "video" => ContentKind::Video,
            "image" => ContentKind::Image,
            "audio" => ContentKind::Audio,
            "document" | "pdf" => ContentKind::Document,
            "screen_mirror" => ContentKind::ScreenMirror,
            "executable_module" | "wasm" | "webassembly" => ContentKind::ExecutableModule,
            "model3d" => ContentKind::Model3D,
            "stream" => ContentKind::Stream,
            "presentation" => ContentKind::Presentation,
            _ => return Err(Error::invalid_option(s, "content_type")),
        };
        Ok(kind)
    }
}

/// Where the bytes for a cast come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ContentSource {
    /// Local file path
    File { path: String },
    /// Remote http(s) resource
    Url { url: String },
    /// An artifact already admitted to the cache, addressed by id
    Cache { key: String },
}

impl ContentSource {
    /// Scheme prefix for cache-addressed sources
    pub const CACHE_SCHEME: &'static str = "cache://";

    /// Parse a request source string. An empty source is an invalid option
    /// of `kind`.
    pub fn parse(kind: ContentKind, raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_option(kind.as_str(), "source"));
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(ContentSource::Url {
                url: trimmed.to_string(),
            });
        }

        if let Some(key) = trimmed.strip_prefix(Self::CACHE_SCHEME) {
            if key.is_empty() {
                return Err(Error::invalid_option(kind.as_str(), "source"));
            }
            return Ok(ContentSource::Cache {
                key: key.to_string(),
            });
        }

        let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
        Ok(ContentSource::File {
            path: path.to_string(),
        })
    }

    /// Normalized form used for identity
    pub fn normalized(&self) -> String {
        match self {
            ContentSource::File { path } => path.clone(),
            ContentSource::Url { url } => url.clone(),
            ContentSource::Cache { key } => format!("{}{}", Self::CACHE_SCHEME, key),
        }
    }
}

impl std::fmt::Display for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.normalized())
    }
}
