//! Directed relationship edge
//!
//! One row describes how `owner` sees `peer`. A friendship between two users
//! is the pair of rows (A,B) and (B,A), each written only by its owner except
//! for the joint accept.

use super::types::{EdgeId, UserId};
use serde::{Deserialize, Serialize};

/// A directed edge owned by `owner`
///
/// Storage keeps three independent flags; callers should reason about the
/// collapsed [`EdgeState`] returned by [`Edge::state`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Minted once, preserved across every upsert
    pub id: EdgeId,

    /// Writer and controller of this row
    pub owner: UserId,

    /// The user this row is about
    pub peer: UserId,

    /// Private annotation the owner keeps about the peer
    pub note: String,

    pub accepted: bool,
    pub blocked: bool,

    /// Soft-delete marker
    pub deleted: bool,

    /// Creation timestamp (Unix milliseconds), kept by the store
    pub created_at: i64,

    /// Last committed write (Unix milliseconds), stamped by the store
    pub updated_at: i64,
}

impl Edge {
    /// A fresh row with every flag cleared
    pub fn new(id: EdgeId, owner: UserId, peer: UserId) -> Self {
        let now = chrono::Utc::now().timestamp_millis();

        Edge {
            id,
            owner,
            peer,
            note: String::new(),
            accepted: false,
            blocked: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Collapsed view of the flags, `deleted` taking precedence
    pub fn state(&self) -> EdgeState {
        if self.deleted {
            EdgeState::Deleted
        } else if self.blocked {
            EdgeState::Blocked
        } else if self.accepted {
            EdgeState::Accepted
        } else {
            EdgeState::Pending
        }
    }

    pub fn key(&self) -> (UserId, UserId) {
        (self.owner, self.peer)
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, delta: &EdgeDelta) {
        if let Some(accepted) = delta.accepted {
            self.accepted = accepted;
        }
        if let Some(blocked) = delta.blocked {
            self.blocked = blocked;
        }
        if let Some(deleted) = delta.deleted {
            self.deleted = deleted;
        }
        if let Some(note) = &delta.note {
            self.note = note.clone();
        }
    }
}

/// Public state of an edge as seen by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeState {
    /// Request sent, not (yet) accepted
    Pending,
    Accepted,
    /// Peer is on the owner's blacklist
    Blocked,
    Deleted,
}

/// Partial update of an edge row; `None` leaves the field alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDelta {
    pub accepted: Option<bool>,
    pub blocked: Option<bool>,
    pub deleted: Option<bool>,
    pub note: Option<String>,
}

impl EdgeDelta {
    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }

    pub fn accepted(mut self, value: bool) -> Self {
        self.accepted = Some(value);
        self
    }

    pub fn blocked(mut self, value: bool) -> Self {
        self.blocked = Some(value);
        self
    }

    pub fn deleted(mut self, value: bool) -> Self {
        self.deleted = Some(value);
        self
    }
}

/// Flag filter for listing an owner's rows; `None` matches either value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFilter {
    pub accepted: Option<bool>,
    pub blocked: Option<bool>,
    pub deleted: Option<bool>,
}

impl EdgeFilter {
    pub fn any() -> Self {
        Self::default()
    }

    /// Effective friends: accepted, not blocked, not deleted
    pub fn friends() -> Self {
        Self {
            accepted: Some(true),
            blocked: Some(false),
            deleted: Some(false),
        }
    }

    /// Live blacklist entries
    pub fn blacklist() -> Self {
        Self {
            accepted: None,
            blocked: Some(true),
            deleted: Some(false),
        }
    }

    /// Outstanding requests sent by the owner
    pub fn pending() -> Self {
        Self {
            accepted: Some(false),
            blocked: Some(false),
            deleted: Some(false),
        }
    }

    pub fn matches(&self, edge: &Edge) -> bool {
        fn check(want: Option<bool>, have: bool) -> bool {
            want.map_or(true, |w| w == have)
        }

        check(self.accepted, edge.accepted)
            && check(self.blocked, edge.blocked)
            && check(self.deleted, edge.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge() -> Edge {
        Edge::new(EdgeId::new(1), UserId::new(10), UserId::new(20))
    }

    #[test]
    fn test_new_edge_is_pending() {
        let e = edge().with_note("coworker");
        assert_eq!(e.state(), EdgeState::Pending);
        assert_eq!(e.note, "coworker");
        assert_eq!(e.key(), (UserId::new(10), UserId::new(20)));
        assert_eq!(e.created_at, e.updated_at);
    }

    #[test]
    fn test_state_precedence() {
        let mut e = edge();
        e.accepted = true;
        assert_eq!(e.state(), EdgeState::Accepted);

        e.blocked = true;
        assert_eq!(e.state(), EdgeState::Blocked);

        // deleted wins even with the other flags still set
        e.deleted = true;
        assert_eq!(e.state(), EdgeState::Deleted);
    }

    #[test]
    fn test_apply_delta() {
        let mut e = edge().with_note("old");
        e.apply(&EdgeDelta::default().deleted(true).accepted(false));
        assert!(e.deleted);
        assert!(!e.accepted);
        assert_eq!(e.note, "old");

        e.apply(&EdgeDelta::note("new"));
        assert_eq!(e.note, "new");
        assert!(e.deleted);
    }

    #[test]
    fn test_filters() {
        let mut e = edge();
        assert!(EdgeFilter::any().matches(&e));
        assert!(EdgeFilter::pending().matches(&e));
        assert!(!EdgeFilter::friends().matches(&e));

        e.accepted = true;
        assert!(EdgeFilter::friends().matches(&e));

        e.blocked = true;
        assert!(!EdgeFilter::friends().matches(&e));
        assert!(EdgeFilter::blacklist().matches(&e));

        e.deleted = true;
        assert!(!EdgeFilter::blacklist().matches(&e));
        assert!(EdgeFilter::any().matches(&e));
    }
}
