//! Domain Value Objects
//!
//! The closed vocabulary shared by the cache and the dispatcher: which kinds of
//! content can be cast, where the content comes from, and the per-kind option
//! records that take part in artifact identity.
//!
//! ```text
//! "audio" + "song.flac" + {"codec": "flac"}
//!     │          │               │
//!     ▼          ▼               ▼
//! ContentKind  ContentSource   CastOptions::Audio { codec, format }
//!     └──────────┴───────────────┘
//!                │
//!                ▼
//!           ArtifactId (sha-256)
//! ```

mod content;
mod options;

pub use content::{ContentKind, ContentSource};
pub use options::{CastOptions, MirrorQuality, StreamProtocol, Theme};
