//! Per-content-type cast options
//!
//! Raw options arrive as a JSON object. Each content kind has a fixed schema;
//! parsing collects every offending field instead of stopping at the first one,
//! and unknown fields are rejected rather than ignored.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::content::ContentKind;
use crate::error::{Error, Result};

// =============================================================================
// Enumerated option values
// =============================================================================

/// Screen mirror quality level, ordered from cheapest to most expensive
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MirrorQuality {
    /// 720p @ 30fps
    Low,
    /// 1080p @ 30fps
    #[default]
    Medium,
    /// 1080p @ 60fps
    High,
    /// 4K @ 60fps
    Ultra,
}

impl MirrorQuality {
    /// Capture resolution (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            MirrorQuality::Low => (1280, 720),
            MirrorQuality::Medium | MirrorQuality::High => (1920, 1080),
            MirrorQuality::Ultra => (3840, 2160),
        }
    }

    /// Capture frame rate
    pub fn frame_rate(&self) -> u32 {
        match self {
            MirrorQuality::Low | MirrorQuality::Medium => 30,
            MirrorQuality::High | MirrorQuality::Ultra => 60,
        }
    }
}

impl FromStr for MirrorQuality {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "low" => Ok(MirrorQuality::Low),
            "medium" => Ok(MirrorQuality::Medium),
            "high" => Ok(MirrorQuality::High),
            "ultra" => Ok(MirrorQuality::Ultra),
            _ => Err(()),
        }
    }
}

/// Markdown rendering theme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            _ => Err(()),
        }
    }
}

/// Live stream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamProtocol {
    Rtsp,
    #[serde(rename = "webrtc")]
    WebRtc,
    Hls,
    Dash,
}

impl FromStr for StreamProtocol {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "rtsp" => Ok(StreamProtocol::Rtsp),
            "webrtc" => Ok(StreamProtocol::WebRtc),
            "hls" => Ok(StreamProtocol::Hls),
            "dash" => Ok(StreamProtocol::Dash),
            _ => Err(()),
        }
    }
}

// =============================================================================
// CastOptions
// =============================================================================

/// Parsed, normalized options for one content kind.
///
/// Field order is fixed by the declaration below, so the JSON form is stable
/// and can take part in artifact identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "content_type")]
pub enum CastOptions {
    #[serde(rename = "markdown")]
    Markdown { theme: Theme },
    #[serde(rename = "video")]
    Video {
        codec: Option<String>,
        container: Option<String>,
    },
    #[serde(rename = "image")]
    Image { format: Option<String> },
    #[serde(rename = "audio")]
    Audio {
        codec: String,
        format: Option<String>,
    },
    #[serde(rename = "document")]
    Document { page: u32 },
    #[serde(rename = "screen_mirror")]
    ScreenMirror {
        quality: MirrorQuality,
        source_display: Option<String>,
    },
    #[serde(rename = "executable_module")]
    ExecutableModule { entry_point: String },
    #[serde(rename = "model3d")]
    Model3D { format: String },
    #[serde(rename = "stream")]
    Stream {
        protocol: Option<StreamProtocol>,
        offer: Option<String>,
    },
    #[serde(rename = "presentation")]
    Presentation { format: Option<String> },
}

impl CastOptions {
    /// Parse raw JSON options against the schema for `kind`
    pub fn parse(kind: ContentKind, raw: &Value) -> Result<Self> {
        let mut r = FieldReader::new(kind, raw)?;

        match kind {
            ContentKind::Markdown => {
                let theme = r.choice::<Theme>("theme");
                r.finish(|| CastOptions::Markdown {
                    theme: theme.unwrap_or_default(),
                })
            }
            ContentKind::Video => {
                let codec = r.string("codec");
                let container = r.string("container");
                r.finish(|| CastOptions::Video { codec, container })
            }
            ContentKind::Image => {
                let format = r.string("format");
                r.finish(|| CastOptions::Image { format })
            }
            ContentKind::Audio => {
                let codec = r.required_string("codec");
                let format = r.string("format");
                r.finish(|| CastOptions::Audio {
                    codec: codec.unwrap_or_default(),
                    format,
                })
            }
            ContentKind::Document => {
                let page = r.positive_u32("page");
                r.finish(|| CastOptions::Document {
                    page: page.unwrap_or(1),
                })
            }
            ContentKind::ScreenMirror => {
                let quality = r.choice::<MirrorQuality>("quality");
                let source_display = r.string("source_display");
                r.finish(|| CastOptions::ScreenMirror {
                    quality: quality.unwrap_or_default(),
                    source_display,
                })
            }
            ContentKind::ExecutableModule => {
                let entry_point = r.string("entry_point");
                r.finish(|| CastOptions::ExecutableModule {
                    entry_point: entry_point.unwrap_or_else(|| "main".to_string()),
                })
            }
            ContentKind::Model3D => {
                let format = r.string("format");
                r.finish(|| CastOptions::Model3D {
                    format: format.unwrap_or_else(|| "gltf".to_string()),
                })
            }
            ContentKind::Stream => {
                let protocol = r.choice::<StreamProtocol>("protocol");
                let offer = r.string("offer");
                r.finish(|| CastOptions::Stream { protocol, offer })
            }
            ContentKind::Presentation => {
                let format = r.string("format");
                r.finish(|| CastOptions::Presentation { format })
            }
        }
    }

    /// Content kind these options belong to
    pub fn kind(&self) -> ContentKind {
        match self {
            CastOptions::Markdown { .. } => ContentKind::Markdown,
            CastOptions::Video { .. } => ContentKind::Video,
            CastOptions::Image { .. } => ContentKind::Image,
            CastOptions::Audio { .. } => ContentKind::Audio,
            CastOptions::Document { .. } => ContentKind::Document,
            CastOptions::ScreenMirror { .. } => ContentKind::ScreenMirror,
            CastOptions::ExecutableModule { .. } => ContentKind::ExecutableModule,
            CastOptions::Model3D { .. } => ContentKind::Model3D,
            CastOptions::Stream { .. } => ContentKind::Stream,
            CastOptions::Presentation { .. } => ContentKind::Presentation,
        }
    }

    /// Stable textual form used for identity
    pub fn canonical(&self) -> String {
        // Serializing plain strings, enums and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// =============================================================================
// Field reader
// =============================================================================

/// Reads typed fields out of a raw option object while recording every
/// missing, malformed or unknown field.
struct FieldReader<'a> {
    kind: ContentKind,
    fields: Option<&'a Map<String, Value>>,
    consumed: Vec<&'static str>,
    invalid: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(kind: ContentKind, raw: &'a Value) -> Result<Self> {
        let fields = match raw {
            Value::Null => None,
            Value::Object(map) => Some(map),
            _ => return Err(Error::invalid_option(kind.as_str(), "options")),
        };
        Ok(Self {
            kind,
            fields,
            consumed: Vec::new(),
            invalid: Vec::new(),
        })
    }

    /// Fetch a field, treating explicit `null` as absent
    fn raw(&mut self, name: &'static str) -> Option<&'a Value> {
        self.consumed.push(name);
        self.fields
            .and_then(|map| map.get(name))
            .filter(|v| !v.is_null())
    }

    fn string(&mut self, name: &'static str) -> Option<String> {
        match self.raw(name)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => {
                self.invalid.push(name.to_string());
                None
            }
        }
    }

    fn required_string(&mut self, name: &'static str) -> Option<String> {
        let value = self.string(name);
        if value.is_none() && !self.invalid.iter().any(|f| f == name) {
            self.invalid.push(name.to_string());
        }
        value
    }

    fn positive_u32(&mut self, name: &'static str) -> Option<u32> {
        let value = self.raw(name)?;
        match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) if n >= 1 => Some(n),
            _ => {
                self.invalid.push(name.to_string());
                None
            }
        }
    }

    fn choice<T: FromStr>(&mut self, name: &'static str) -> Option<T> {
        let value = self.raw(name)?;
        let parsed = value
            .as_str()
            .and_then(|s| s.trim().to_ascii_lowercase().parse::<T>().ok());
        if parsed.is_none() {
            self.invalid.push(name.to_string());
        }
        parsed
    }

    fn finish<T>(mut self, build: impl FnOnce() -> T) -> Result<T> {
        if let Some(map) = self.fields {
            let mut unknown: Vec<String> = map
                .keys()
                .filter(|k| !self.consumed.contains(&k.as_str()))
                .cloned()
                .collect();
            unknown.sort();
            self.invalid.extend(unknown);
        }

        if self.invalid.is_empty() {
            Ok(build())
        } else {
            Err(Error::InvalidOptions {
                content_type: self.kind.as_str().to_string(),
                fields: self.invalid,
            })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
