//! Social graph data model
//!
//! Directed edges keyed by (owner, peer), their change events, and the
//! best-effort adjacency mirror fed by those events.

pub mod edge;
pub mod event;
pub mod mirror;
pub mod types;

// Re-export main types
pub use edge::{Edge, EdgeDelta, EdgeFilter, EdgeState};
pub use event::{EdgeEvent, EdgeEventKind};
pub use mirror::{AdjacencyMirror, ChannelMirror, GraphMirror, MirrorError, MirrorResult, NoopMirror};
pub use types::{EdgeId, UserId};
