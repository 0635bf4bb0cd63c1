//! Relationship change events
//!
//! Emitted after a successful commit so denormalized views can follow the
//! authoritative edge rows.

use super::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeEventKind {
    /// `owner` sent a friend request to `peer`
    Requested,
    /// `owner` accepted `peer`'s request; both rows are now accepted
    Accepted,
    /// `owner` put `peer` on their blacklist
    Blocked,
    /// `owner` took `peer` off their blacklist
    Unblocked,
    NoteUpdated,
    /// Both rows were soft-deleted by `owner`
    Unfriended,
}

impl fmt::Display for EdgeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeEventKind::Requested => "requested",
            EdgeEventKind::Accepted => "accepted",
            EdgeEventKind::Blocked => "blocked",
            EdgeEventKind::Unblocked => "unblocked",
            EdgeEventKind::NoteUpdated => "note_updated",
            EdgeEventKind::Unfriended => "unfriended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEvent {
    pub owner: UserId,
    pub peer: UserId,
    pub kind: EdgeEventKind,
}

impl EdgeEvent {
    pub fn new(owner: UserId, peer: UserId, kind: EdgeEventKind) -> Self {
        Self { owner, peer, kind }
    }
}
