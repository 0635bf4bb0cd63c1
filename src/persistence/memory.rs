//! In-memory store
//!
//! Serializable by construction: a transaction holds the store-wide row lock
//! from `begin` until commit or rollback, and buffers its writes until commit.
//! Also carries fault injection hooks so tests can exercise rollback paths.

use super::store::{
    merge_upsert, RelationshipStore, StoreError, StoreResult, StoreTransaction, UserDirectory,
    UserProfile,
};
use crate::graph::{Edge, EdgeDelta, EdgeFilter, UserId};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

type EdgeKey = (UserId, UserId);

#[derive(Debug, Default)]
struct Faults {
    /// Successful writes to allow before the next one fails
    fail_write_after: Option<usize>,
    fail_next_commit: bool,
}

/// Edge rows and user profiles held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    edges: Mutex<BTreeMap<EdgeKey, Edge>>,
    users: RwLock<HashMap<UserId, UserProfile>>,
    faults: Mutex<Faults>,
    committed_writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_user(&self, profile: UserProfile) {
        self.users.write().insert(profile.id, profile);
    }

    /// Soft-delete a user; returns false if the user is unknown
    pub fn mark_user_deleted(&self, user: UserId) -> bool {
        match self.users.write().get_mut(&user) {
            Some(profile) => {
                profile.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Let `after` writes succeed, then fail the next one with a transient error
    pub fn inject_write_failure(&self, after: usize) {
        self.faults.lock().fail_write_after = Some(after);
    }

    /// Fail the next commit with a conflict
    pub fn inject_commit_failure(&self) {
        self.faults.lock().fail_next_commit = true;
    }

    /// Number of row writes committed so far
    pub fn committed_writes(&self) -> u64 {
        self.committed_writes.load(Ordering::SeqCst)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.lock().len()
    }
}

impl RelationshipStore for MemoryStore {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(MemoryTx {
            store: self,
            rows: self.edges.lock(),
            pending: BTreeMap::new(),
        }))
    }

    fn get(&self, owner: UserId, peer: UserId) -> StoreResult<Option<Edge>> {
        Ok(self.edges.lock().get(&(owner, peer)).cloned())
    }

    fn query(&self, owner: UserId, filter: &EdgeFilter) -> StoreResult<Vec<Edge>> {
        let rows = self.edges.lock();
        let mut edges: Vec<Edge> = rows
            .range((owner, UserId::new(0))..=(owner, UserId::new(u64::MAX)))
            .map(|(_, edge)| edge)
            .filter(|edge| filter.matches(edge))
            .cloned()
            .collect();
        edges.sort_by_key(|edge| edge.id);
        Ok(edges)
    }
}

impl UserDirectory for MemoryStore {
    fn profile(&self, user: UserId) -> StoreResult<Option<UserProfile>> {
        Ok(self
            .users
            .read()
            .get(&user)
            .filter(|profile| !profile.deleted)
            .cloned())
    }
}

struct MemoryTx<'a> {
    store: &'a MemoryStore,
    rows: MutexGuard<'a, BTreeMap<EdgeKey, Edge>>,
    pending: BTreeMap<EdgeKey, Edge>,
}

impl MemoryTx<'_> {
    fn current(&self, key: &EdgeKey) -> Option<&Edge> {
        self.pending.get(key).or_else(|| self.rows.get(key))
    }

    fn check_write_fault(&self) -> StoreResult<()> {
        let mut faults = self.store.faults.lock();
        let remaining = faults.fail_write_after;
        match remaining {
            Some(0) => {
                faults.fail_write_after = None;
                Err(StoreError::Transient("injected write failure".to_string()))
            }
            Some(n) => {
                faults.fail_write_after = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl StoreTransaction for MemoryTx<'_> {
    fn get_for_update(&mut self, owner: UserId, peer: UserId) -> StoreResult<Option<Edge>> {
        // The whole map is already locked for this transaction
        Ok(self.current(&(owner, peer)).cloned())
    }

    fn upsert(&mut self, edge: Edge) -> StoreResult<Edge> {
        self.check_write_fault()?;

        let key = edge.key();
        let now = chrono::Utc::now().timestamp_millis();
        let stored = merge_upsert(self.current(&key), edge, now);
        self.pending.insert(key, stored.clone());
        Ok(stored)
    }

    fn update_flags(&mut self, owner: UserId, peer: UserId, delta: &EdgeDelta) -> StoreResult<u64> {
        let key = (owner, peer);
        let mut edge = match self.current(&key) {
            Some(edge) => edge.clone(),
            None => return Ok(0),
        };

        self.check_write_fault()?;

        edge.apply(delta);
        edge.updated_at = chrono::Utc::now().timestamp_millis();
        self.pending.insert(key, edge);
        Ok(1)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tx = *self;

        {
            let mut faults = tx.store.faults.lock();
            if faults.fail_next_commit {
                faults.fail_next_commit = false;
                return Err(StoreError::Conflict("injected commit failure".to_string()));
            }
        }

        let written = tx.pending.len() as u64;
        let pending = std::mem::take(&mut tx.pending);
        tx.rows.extend(pending);
        tx.store.committed_writes.fetch_add(written, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
