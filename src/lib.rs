//! Tailview - live chat log viewer
//!
//! Keeps a local, deduplicated, timestamp-ordered copy of a remote conversation
//! log and shows it through a windowed renderer that mounts only what is on
//! screen.
//!
//! ## Architecture
//!
//! - **Sync**: one task per session drives a pull (HTTP polling) or push
//!   (Socket.IO) transport, merges batches through the dedup store and emits
//!   events tagged with the session id.
//! - **Render**: `Renderer<H>` maps a scroll offset to a bounded index window
//!   and mounts/unmounts rows on a `RenderHost`.
//! - **Session**: `SessionController<H>` owns both, routes deltas and drops
//!   events from superseded sessions.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -- --sources chat.jsonl --mode push
//! ```

// Core modules (available on all platforms)
pub mod config;
pub mod error;
pub mod types;
pub mod util_text;

// Sync pipeline
pub mod dedup;
pub mod fingerprint;
pub mod net;
pub mod socketio;
pub mod source_http;
pub mod source_ws;
pub mod sync;
pub mod transport;

// Rendering and session control
pub mod render;
pub mod session;

// Terminal front-end state and drawing
pub mod app;
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use error::{SyncError, TransportError};
pub use render::{Anchor, RenderHost, Renderer, ViewportWindow};
pub use session::{ModeAnchors, SessionController};
pub use types::{ConnectionState, Mode, Record, Role, SessionId};
