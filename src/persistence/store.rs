//! Storage contracts consumed by the relationship service
//!
//! A [`RelationshipStore`] hands out transactions over edge rows keyed by
//! (owner, peer). Rows read through [`StoreTransaction::get_for_update`] stay
//! locked until the transaction commits or rolls back, which is what makes the
//! service's check-then-write sequences safe under concurrency.

use crate::graph::{Edge, EdgeDelta, EdgeFilter, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(rocksdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Column family error
    #[error("Column family error: {0}")]
    ColumnFamily(String),

    /// Lock wait timeout, contention or lost connection; safe to retry
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// Commit-time constraint violation
    #[error("Transaction conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One open transaction against the edge rows
///
/// Dropping a transaction without committing discards its writes.
pub trait StoreTransaction {
    /// Read a row and hold an exclusive lock on its key until the end of the transaction
    fn get_for_update(&mut self, owner: UserId, peer: UserId) -> StoreResult<Option<Edge>>;

    /// Insert or replace the row keyed by `edge.owner, edge.peer`
    ///
    /// When the row already exists its `id` and `created_at` win over the
    /// values in `edge`. Returns the row as it will be committed.
    fn upsert(&mut self, edge: Edge) -> StoreResult<Edge>;

    /// Apply `delta` to an existing row; returns the number of rows affected (0 or 1)
    fn update_flags(&mut self, owner: UserId, peer: UserId, delta: &EdgeDelta) -> StoreResult<u64>;

    fn commit(self: Box<Self>) -> StoreResult<()>;

    fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Transactional edge storage
pub trait RelationshipStore: Send + Sync {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>>;

    /// Committed read without locking
    fn get(&self, owner: UserId, peer: UserId) -> StoreResult<Option<Edge>>;

    /// All of `owner`'s rows matching `filter`, ordered by edge id ascending
    fn query(&self, owner: UserId, filter: &EdgeFilter) -> StoreResult<Vec<Edge>>;
}

/// Display fields of a user, owned by the identity subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub mobile: String,
    /// Avatar file reference
    pub avatar: String,
    /// Soft-delete flag; deleted users do not exist for the relationship engine
    pub deleted: bool,
}

impl UserProfile {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: String::new(),
            mobile: String::new(),
            avatar: String::new(),
            deleted: false,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }
}

/// Existence and profile lookup for users
pub trait UserDirectory: Send + Sync {
    /// Profile of a live (not soft-deleted) user
    fn profile(&self, user: UserId) -> StoreResult<Option<UserProfile>>;

    fn exists(&self, user: UserId) -> StoreResult<bool> {
        Ok(self.profile(user)?.is_some())
    }
}

/// Upsert merge rule shared by the stores: identity fields of an existing row survive
pub(crate) fn merge_upsert(existing: Option<&Edge>, mut edge: Edge, now_ms: i64) -> Edge {
    if let Some(current) = existing {
        edge.id = current.id;
        edge.created_at = current.created_at;
    }
    edge.updated_at = now_ms;
    edge
}
