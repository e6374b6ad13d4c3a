//! Casting
//!
//! The dispatcher resolves cast requests into cached artifacts through
//! pluggable renderers and tracks one session per display.
//!
//! # Modules
//!
//! - [`dispatcher`] - request routing, single-flight resolution, deadlines
//! - [`renderer`] - the renderer collaborator trait and per-type registry
//! - [`session`] - cast session state machine and registry

pub mod dispatcher;
pub mod renderer;
pub mod session;

pub use dispatcher::{CastOutcome, Dispatcher};
pub use renderer::{Renderer, RendererSet};
pub use session::{CastSession, ControlAction, PlaybackState, SessionRegistry, SessionState};
