//! Best-effort adjacency mirror
//!
//! Keeps per-user friend and blacklist sets current from [`EdgeEvent`]s so
//! other services (message fan-out, presence) can answer "who are my friends"
//! without touching the edge store. The mirror is never authoritative: a lost
//! event only makes it stale, and its failures never fail a relationship
//! operation.

use super::event::{EdgeEvent, EdgeEventKind};
use super::types::UserId;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Mirror errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// The consuming side of the mirror has gone away
    #[error("Mirror consumer disconnected")]
    Disconnected,
}

pub type MirrorResult<T> = Result<T, MirrorError>;

/// Receiver of committed relationship changes
pub trait GraphMirror: Send + Sync {
    fn publish(&self, event: &EdgeEvent) -> MirrorResult<()>;
}

/// Mirror that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMirror;

impl GraphMirror for NoopMirror {
    fn publish(&self, _event: &EdgeEvent) -> MirrorResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Adjacency {
    friends: HashMap<UserId, BTreeSet<UserId>>,
    blacklist: HashMap<UserId, BTreeSet<UserId>>,
}

/// In-process adjacency cache
#[derive(Debug, Default)]
pub struct AdjacencyMirror {
    inner: RwLock<Adjacency>,
}

impl AdjacencyMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the adjacency sets
    pub fn apply(&self, event: &EdgeEvent) {
        let mut adj = self.inner.write();
        let (owner, peer) = (event.owner, event.peer);

        match event.kind {
            EdgeEventKind::Accepted => {
                adj.friends.entry(owner).or_default().insert(peer);
                adj.friends.entry(peer).or_default().insert(owner);
                // Accepting clears the responder's own block
                Self::unblock(&mut adj, owner, peer);
            }
            EdgeEventKind::Unfriended => {
                if let Some(set) = adj.friends.get_mut(&owner) {
                    set.remove(&peer);
                }
                if let Some(set) = adj.friends.get_mut(&peer) {
                    set.remove(&owner);
                }
            }
            EdgeEventKind::Blocked => {
                adj.blacklist.entry(owner).or_default().insert(peer);
            }
            EdgeEventKind::Unblocked | EdgeEventKind::Requested => {
                Self::unblock(&mut adj, owner, peer);
            }
            EdgeEventKind::NoteUpdated => {}
        }

        debug!("Mirror applied {} for {} -> {}", event.kind, owner, peer);
    }

    fn unblock(adj: &mut Adjacency, owner: UserId, peer: UserId) {
        if let Some(set) = adj.blacklist.get_mut(&owner) {
            set.remove(&peer);
        }
    }

    pub fn friends_of(&self, user: UserId) -> Vec<UserId> {
        self.inner
            .read()
            .friends
            .get(&user)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn blacklist_of(&self, user: UserId) -> Vec<UserId> {
        self.inner
            .read()
            .blacklist
            .get(&user)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `owner` has `peer` on their blacklist
    pub fn is_blocked_by(&self, peer: UserId, owner: UserId) -> bool {
        self.inner
            .read()
            .blacklist
            .get(&owner)
            .map_or(false, |set| set.contains(&peer))
    }

    /// Drain a channel fed by [`ChannelMirror`] until every sender is dropped
    pub async fn run(self: Arc<Self>, mut receiver: UnboundedReceiver<EdgeEvent>) {
        info!("Adjacency mirror consumer started");

        while let Some(event) = receiver.recv().await {
            self.apply(&event);
        }

        info!("Adjacency mirror consumer stopped");
    }
}

impl GraphMirror for AdjacencyMirror {
    fn publish(&self, event: &EdgeEvent) -> MirrorResult<()> {
        self.apply(event);
        Ok(())
    }
}

/// Mirror that hands events to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelMirror {
    sender: UnboundedSender<EdgeEvent>,
}

impl ChannelMirror {
    pub fn new() -> (Self, UnboundedReceiver<EdgeEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl GraphMirror for ChannelMirror {
    fn publish(&self, event: &EdgeEvent) -> MirrorResult<()> {
        self.sender
            .send(*event)
            .map_err(|_| MirrorError::Disconnected)
    }
}
