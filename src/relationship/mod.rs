//! Friend relationship engine
//!
//! [`RelationshipService`] drives the per-pair state machine
//! `NonExistent -> Pending -> Accepted`, with blocked and deleted overlays
//! that later writes can clear.

pub mod deadline;
pub mod error;
pub mod service;

pub use deadline::Deadline;
pub use error::{ErrorClass, RelationshipError, RelationshipResult};
pub use service::{FriendEntry, RelationshipService};
