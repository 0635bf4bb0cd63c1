//! Relationship state machine
//!
//! Every mutation runs in exactly one store transaction: the rows involved are
//! read with `get_for_update`, validated, then written, so no other operation
//! on the same pair can slip in between the check and the write. Events go to
//! the mirror only after a successful commit.

use super::deadline::Deadline;
use super::error::{RelationshipError, RelationshipResult};
use crate::config::ServiceConfig;
use crate::graph::{
    Edge, EdgeDelta, EdgeEvent, EdgeEventKind, EdgeFilter, EdgeId, GraphMirror, UserId,
};
use crate::id::IdGenerator;
use crate::persistence::{RelationshipStore, StoreResult, StoreTransaction, UserDirectory, UserProfile};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One row of a friend listing joined with the peer's profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendEntry {
    pub peer: UserId,
    pub profile: UserProfile,
    /// The owner's note about the peer
    pub note: String,
    /// Whether the owner has the peer on their blacklist
    pub blocked: bool,
}

/// Friend request, accept, block, unfriend and annotate operations
pub struct RelationshipService {
    store: Arc<dyn RelationshipStore>,
    directory: Arc<dyn UserDirectory>,
    generator: Arc<dyn IdGenerator>,
    mirror: Arc<dyn GraphMirror>,
    operation_timeout: Duration,
}

/// Read (owner→peer) and (peer→owner) under lock, always locking in key order
fn lock_pair(
    tx: &mut dyn StoreTransaction,
    owner: UserId,
    peer: UserId,
) -> StoreResult<(Option<Edge>, Option<Edge>)> {
    if owner <= peer {
        let forward = tx.get_for_update(owner, peer)?;
        let reverse = tx.get_for_update(peer, owner)?;
        Ok((forward, reverse))
    } else {
        let reverse = tx.get_for_update(peer, owner)?;
        let forward = tx.get_for_update(owner, peer)?;
        Ok((forward, reverse))
    }
}

impl RelationshipService {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        directory: Arc<dyn UserDirectory>,
        generator: Arc<dyn IdGenerator>,
        mirror: Arc<dyn GraphMirror>,
        config: &ServiceConfig,
    ) -> Self {
        info!(
            "Relationship service ready (operation timeout {} ms)",
            config.operation_timeout_ms
        );

        Self {
            store,
            directory,
            generator,
            mirror,
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
        }
    }

    /// Deadline derived from the configured operation timeout
    pub fn default_deadline(&self) -> Deadline {
        Deadline::after(self.operation_timeout)
    }

    /// Send a friend request from `me` to `peer`, returning the request row's id
    ///
    /// Repeating a request rewrites the same row and returns the same id.
    pub fn request_friend(
        &self,
        me: UserId,
        peer: UserId,
        note: &str,
        deadline: Deadline,
    ) -> RelationshipResult<EdgeId> {
        if me == peer {
            return Err(RelationshipError::SelfRelation(me));
        }
        deadline.check()?;
        if !self.directory.exists(peer)? {
            return Err(RelationshipError::PeerNotFound(peer));
        }

        let edge = self.in_transaction(deadline, |tx| {
            let (mine, theirs) = lock_pair(tx, me, peer)?;

            if theirs.as_ref().map_or(false, |e| e.blocked) {
                return Err(RelationshipError::Blocked(peer));
            }
            if mine.as_ref().map_or(false, |e| e.accepted) {
                return Err(RelationshipError::AlreadyFriends(peer));
            }
            deadline.check()?;

            let mut edge = self.existing_or_new(mine, me, peer)?;
            edge.note = note.to_string();
            edge.accepted = false;
            edge.blocked = false;
            edge.deleted = false;
            Ok(tx.upsert(edge)?)
        })?;

        debug!("Friend request {} -> {} stored as {}", me, peer, edge.id);
        self.publish(EdgeEvent::new(me, peer, EdgeEventKind::Requested));
        Ok(edge.id)
    }

    /// Accept or reject the pending request `requester` sent to `me`
    ///
    /// Rejecting blacklists the requester on `me`'s side; the requester's own
    /// row stays pending.
    pub fn respond_to_request(
        &self,
        me: UserId,
        requester: UserId,
        note: &str,
        accept: bool,
        deadline: Deadline,
    ) -> RelationshipResult<()> {
        if me == requester {
            return Err(RelationshipError::SelfRelation(me));
        }

        let kind = self.in_transaction(deadline, |tx| {
            let (mine, theirs) = lock_pair(tx, me, requester)?;

            if mine.as_ref().map_or(false, |e| e.accepted) {
                return Err(RelationshipError::AlreadyFriends(requester));
            }
            // The requester may have blocked `me` since asking; the request still stands
            if !theirs.as_ref().map_or(false, |e| !e.accepted && !e.deleted) {
                return Err(RelationshipError::RequestNotFound(requester));
            }
            deadline.check()?;

            let mut edge = self.existing_or_new(mine, me, requester)?;
            let kind = if accept {
                edge.accepted = true;
                edge.blocked = false;
                edge.deleted = false;
                tx.upsert(edge)?;
                tx.update_flags(requester, me, &EdgeDelta::default().accepted(true))?;
                EdgeEventKind::Accepted
            } else {
                edge.blocked = true;
                edge.deleted = false;
                tx.upsert(edge)?;
                EdgeEventKind::Blocked
            };

            if !note.is_empty() {
                if let Err(err) = tx.update_flags(me, requester, &EdgeDelta::note(note)) {
                    warn!("Note update for {} -> {} skipped: {}", me, requester, err);
                }
            }

            Ok(kind)
        })?;

        debug!("{} responded to {}: {}", me, requester, kind);
        self.publish(EdgeEvent::new(me, requester, kind));
        Ok(())
    }

    /// Put `peer` on or take them off `me`'s blacklist
    pub fn set_block(
        &self,
        me: UserId,
        peer: UserId,
        blocked: bool,
        deadline: Deadline,
    ) -> RelationshipResult<()> {
        if me == peer {
            return Err(RelationshipError::SelfRelation(me));
        }

        let edge = self.in_transaction(deadline, |tx| {
            let existing = tx.get_for_update(me, peer)?;
            if existing.as_ref().map_or(false, |e| e.blocked == blocked) {
                return Err(RelationshipError::NoChange);
            }
            deadline.check()?;

            let mut edge = self.existing_or_new(existing, me, peer)?;
            edge.blocked = blocked;
            if blocked {
                edge.deleted = false;
            }
            Ok(tx.upsert(edge)?)
        })?;

        let kind = if blocked {
            EdgeEventKind::Blocked
        } else {
            EdgeEventKind::Unblocked
        };
        debug!("{} {} {} (edge {})", me, kind, peer, edge.id);
        self.publish(EdgeEvent::new(me, peer, kind));
        Ok(())
    }

    /// Replace `me`'s note about `peer`; never creates a row
    pub fn update_note(
        &self,
        me: UserId,
        peer: UserId,
        note: &str,
        deadline: Deadline,
    ) -> RelationshipResult<()> {
        self.in_transaction(deadline, |tx| {
            deadline.check()?;
            if tx.update_flags(me, peer, &EdgeDelta::note(note))? == 0 {
                return Err(RelationshipError::NoEdge { owner: me, peer });
            }
            Ok(())
        })?;

        debug!("Note updated for {} -> {}", me, peer);
        self.publish(EdgeEvent::new(me, peer, EdgeEventKind::NoteUpdated));
        Ok(())
    }

    /// Soft-delete both rows of the pair, or neither
    ///
    /// Blacklist flags and notes survive so a block outlives the friendship.
    pub fn unfriend(&self, me: UserId, peer: UserId, deadline: Deadline) -> RelationshipResult<()> {
        if me == peer {
            return Err(RelationshipError::SelfRelation(me));
        }

        self.in_transaction(deadline, |tx| {
            lock_pair(tx, me, peer)?;
            deadline.check()?;

            let delta = EdgeDelta::default().deleted(true).accepted(false);
            if tx.update_flags(me, peer, &delta)? == 0 || tx.update_flags(peer, me, &delta)? == 0 {
                return Err(RelationshipError::NoEdge { owner: me, peer });
            }
            Ok(())
        })?;

        debug!("{} unfriended {}", me, peer);
        self.publish(EdgeEvent::new(me, peer, EdgeEventKind::Unfriended));
        Ok(())
    }

    /// Committed row (owner→peer), if any
    pub fn get_edge(&self, owner: UserId, peer: UserId) -> RelationshipResult<Option<Edge>> {
        Ok(self.store.get(owner, peer)?)
    }

    /// `owner`'s rows matching `filter`, ordered by edge id
    pub fn list_edges(&self, owner: UserId, filter: &EdgeFilter) -> RelationshipResult<Vec<Edge>> {
        Ok(self.store.query(owner, filter)?)
    }

    /// Accepted, non-deleted rows of `owner` joined with the peers' profiles
    ///
    /// Rows whose peer has no live profile are left out.
    pub fn list_friends_with_profile(&self, owner: UserId) -> RelationshipResult<Vec<FriendEntry>> {
        let filter = EdgeFilter {
            accepted: Some(true),
            blocked: None,
            deleted: Some(false),
        };

        let mut entries = Vec::new();
        for edge in self.store.query(owner, &filter)? {
            match self.directory.profile(edge.peer)? {
                Some(profile) => entries.push(FriendEntry {
                    peer: edge.peer,
                    profile,
                    note: edge.note,
                    blocked: edge.blocked,
                }),
                None => debug!("Skipping {} in {}'s friend list: no profile", edge.peer, owner),
            }
        }
        Ok(entries)
    }

    /// Peers `owner` is effectively friends with (accepted, not blocked, not deleted)
    pub fn friend_ids(&self, owner: UserId) -> RelationshipResult<Vec<UserId>> {
        self.peer_ids(owner, &EdgeFilter::friends())
    }

    /// Peers on `owner`'s blacklist
    pub fn blacklist_ids(&self, owner: UserId) -> RelationshipResult<Vec<UserId>> {
        self.peer_ids(owner, &EdgeFilter::blacklist())
    }

    fn peer_ids(&self, owner: UserId, filter: &EdgeFilter) -> RelationshipResult<Vec<UserId>> {
        Ok(self
            .store
            .query(owner, filter)?
            .into_iter()
            .map(|edge| edge.peer)
            .collect())
    }

    fn existing_or_new(
        &self,
        existing: Option<Edge>,
        owner: UserId,
        peer: UserId,
    ) -> RelationshipResult<Edge> {
        match existing {
            Some(edge) => Ok(edge),
            None => {
                let id = self.generator.generate()?;
                Ok(Edge::new(EdgeId::from(id), owner, peer))
            }
        }
    }

    /// Run `op` in one transaction; any error or an expired deadline rolls it back
    fn in_transaction<T, F>(&self, deadline: Deadline, op: F) -> RelationshipResult<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> RelationshipResult<T>,
    {
        deadline.check()?;

        let mut tx = self.store.begin()?;
        let value = match op(&mut *tx) {
            Ok(value) => value,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
                // A lock wait that outlived the caller's deadline is a timeout
                if matches!(err, RelationshipError::Transient(_)) && deadline.is_expired() {
                    return Err(RelationshipError::TimedOut);
                }
                return Err(err);
            }
        };

        if deadline.is_expired() {
            if let Err(rollback_err) = tx.rollback() {
                warn!("Rollback failed: {}", rollback_err);
            }
            return Err(RelationshipError::TimedOut);
        }

        tx.commit()?;
        Ok(value)
    }

    fn publish(&self, event: EdgeEvent) {
        if let Err(err) = self.mirror.publish(&event) {
            warn!(
                "Mirror publish of {} for {} -> {} failed: {}",
                event.kind, event.owner, event.peer, err
            );
        }
    }
}
