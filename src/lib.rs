//! Caster Core - Content Cache and Cast Dispatcher
//!
//! Renders heterogeneous content (markdown, video, documents, screen mirrors,
//! 3D models, ...) into artifacts that a display can play, and keeps those
//! artifacts in a two-tier cache so repeat casts skip the render.
//!
//! # Architecture
//!
//! ```text
//! tools::CastService ──▶ cast::Dispatcher ──▶ cache::ContentCache
//!                              │                  │        │
//!                              ▼                  ▼        ▼
//!                      SessionRegistry      MemoryTier  DiskTier
//!                              │
//!                              ▼
//!                       dyn Renderer (per content type)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Two-tier artifact cache with single-flight production
//! - [`cast`] - Dispatcher, renderer seam and cast sessions
//! - [`config`] - Cache configuration
//! - [`domain`] - Content kinds, sources and per-kind options
//! - [`error`] - Error types
//! - [`telemetry`] - Prometheus export and health flags
//! - [`tools`] - Request/response surface for tool calls

pub mod cache;
pub mod cast;
pub mod config;
pub mod domain;
pub mod error;
pub mod telemetry;
pub mod tools;

// Re-export commonly used types
pub use cache::{ArtifactEntry, ArtifactId, CacheStats, ContentCache, RenderOutput};
pub use cast::{CastSession, Dispatcher, Renderer, RendererSet, SessionState};
pub use config::CasterConfig;
pub use domain::{CastOptions, ContentKind, ContentSource};
pub use error::{Error, Result};
pub use tools::CastService;
