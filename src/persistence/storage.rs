//! RocksDB storage layer implementation
//!
//! Edge rows live in the `edges` column family under `{owner}:{peer}` keys, so
//! an owner's rows form one contiguous key range. User profiles live in
//! `users`. Writes go through a pessimistic `TransactionDB`: rows read for
//! update stay locked until commit, and lock waits are bounded by the
//! configured timeout.

use super::store::{
    merge_upsert, RelationshipStore, StoreError, StoreResult, StoreTransaction, UserDirectory,
    UserProfile,
};
use crate::graph::{Edge, EdgeDelta, EdgeFilter, EdgeId, UserId};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode,
    MultiThreaded, Options, Transaction, TransactionDB, TransactionDBOptions,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const CF_EDGES: &str = "edges";
const CF_USERS: &str = "users";

type Db = TransactionDB<MultiThreaded>;

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::Busy | ErrorKind::TryAgain | ErrorKind::Expired => {
                StoreError::Transient(err.to_string())
            }
            _ => StoreError::RocksDb(err),
        }
    }
}

/// Serialized edge for storage
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEdge {
    id: u64,
    owner: u64,
    peer: u64,
    note: String,
    accepted: bool,
    blocked: bool,
    deleted: bool,
    created_at: i64,
    updated_at: i64,
}

impl From<&Edge> for StoredEdge {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id.as_u64(),
            owner: edge.owner.as_u64(),
            peer: edge.peer.as_u64(),
            note: edge.note.clone(),
            accepted: edge.accepted,
            blocked: edge.blocked,
            deleted: edge.deleted,
            created_at: edge.created_at,
            updated_at: edge.updated_at,
        }
    }
}

impl From<StoredEdge> for Edge {
    fn from(stored: StoredEdge) -> Self {
        Edge {
            id: EdgeId::new(stored.id),
            owner: UserId::new(stored.owner),
            peer: UserId::new(stored.peer),
            note: stored.note,
            accepted: stored.accepted,
            blocked: stored.blocked,
            deleted: stored.deleted,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

fn encode_edge(edge: &Edge) -> StoreResult<Vec<u8>> {
    Ok(bincode::serialize(&StoredEdge::from(edge))?)
}

fn decode_edge(bytes: &[u8]) -> StoreResult<Edge> {
    let stored: StoredEdge = bincode::deserialize(bytes)?;
    Ok(stored.into())
}

fn column_family<'a>(db: &'a Db, name: &str) -> StoreResult<Arc<BoundColumnFamily<'a>>> {
    db.cf_handle(name)
        .ok_or_else(|| StoreError::ColumnFamily(name.to_string()))
}

/// RocksDB-based persistent storage
pub struct PersistentStorage {
    db: Arc<Db>,
    path: String,
}

impl PersistentStorage {
    /// Open or create a store; `lock_timeout_ms` bounds every row lock wait
    pub fn open(path: impl AsRef<Path>, lock_timeout_ms: i64) -> StoreResult<Self> {
        let path_str = path.as_ref().to_string_lossy().into_owned();

        info!("Opening relationship storage at: {}", path_str);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        opts.set_write_buffer_size(64 * 1024 * 1024); // 64 MB
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_wal_recovery_mode(rocksdb::DBRecoveryMode::PointInTime);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(lock_timeout_ms);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_EDGES, Self::edge_cf_options()),
            ColumnFamilyDescriptor::new(CF_USERS, Self::user_cf_options()),
        ];

        let db = Db::open_cf_descriptors(&opts, &txn_opts, &path_str, cf_descriptors)?;

        info!("Relationship storage opened (lock timeout {} ms)", lock_timeout_ms);

        Ok(Self {
            db: Arc::new(db),
            path: path_str,
        })
    }

    fn edge_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn user_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Store or replace a user profile
    pub fn put_user(&self, profile: &UserProfile) -> StoreResult<()> {
        let cf = column_family(&self.db, CF_USERS)?;
        let value = bincode::serialize(profile)?;
        self.db.put_cf(&cf, Self::user_key(profile.id), value)?;

        debug!("Stored profile for {}", profile.id);
        Ok(())
    }

    /// Soft-delete a user; returns false if the user is unknown
    pub fn mark_user_deleted(&self, user: UserId) -> StoreResult<bool> {
        let cf = column_family(&self.db, CF_USERS)?;
        let key = Self::user_key(user);

        let mut profile: UserProfile = match self.db.get_cf(&cf, &key)? {
            Some(value) => bincode::deserialize(&value)?,
            None => return Ok(false),
        };
        profile.deleted = true;
        self.db.put_cf(&cf, key, bincode::serialize(&profile)?)?;

        info!("Marked {} as deleted", user);
        Ok(true)
    }

    /// Release the database handle
    pub fn close(self) {
        info!("Closing relationship storage at: {}", self.path);
        drop(self.db);
    }

    fn edge_key(owner: UserId, peer: UserId) -> Vec<u8> {
        format!("{:016x}:{:016x}", owner.as_u64(), peer.as_u64()).into_bytes()
    }

    fn owner_prefix(owner: UserId) -> Vec<u8> {
        format!("{:016x}:", owner.as_u64()).into_bytes()
    }

    fn user_key(user: UserId) -> Vec<u8> {
        format!("{:016x}", user.as_u64()).into_bytes()
    }
}

impl RelationshipStore for PersistentStorage {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(RocksTx {
            db: &self.db,
            txn: self.db.transaction(),
        }))
    }

    fn get(&self, owner: UserId, peer: UserId) -> StoreResult<Option<Edge>> {
        let cf = column_family(&self.db, CF_EDGES)?;
        match self.db.get_cf(&cf, Self::edge_key(owner, peer))? {
            Some(value) => Ok(Some(decode_edge(&value)?)),
            None => Ok(None),
        }
    }

    fn query(&self, owner: UserId, filter: &EdgeFilter) -> StoreResult<Vec<Edge>> {
        let cf = column_family(&self.db, CF_EDGES)?;
        let prefix = Self::owner_prefix(owner);
        let mut edges = Vec::new();

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let edge = decode_edge(&value)?;
            if filter.matches(&edge) {
                edges.push(edge);
            }
        }

        edges.sort_by_key(|edge| edge.id);
        debug!("Query for {} returned {} edges", owner, edges.len());
        Ok(edges)
    }
}

impl UserDirectory for PersistentStorage {
    fn profile(&self, user: UserId) -> StoreResult<Option<UserProfile>> {
        let cf = column_family(&self.db, CF_USERS)?;
        match self.db.get_cf(&cf, Self::user_key(user))? {
            Some(value) => {
                let profile: UserProfile = bincode::deserialize(&value)?;
                Ok(Some(profile).filter(|p| !p.deleted))
            }
            None => Ok(None),
        }
    }
}

struct RocksTx<'a> {
    db: &'a Db,
    txn: Transaction<'a, Db>,
}

impl RocksTx<'_> {
    fn read_locked(&self, owner: UserId, peer: UserId) -> StoreResult<Option<Edge>> {
        let cf = column_family(self.db, CF_EDGES)?;
        let key = PersistentStorage::edge_key(owner, peer);
        match self.txn.get_for_update_cf(&cf, key, true)? {
            Some(value) => Ok(Some(decode_edge(&value)?)),
            None => Ok(None),
        }
    }

    fn write(&self, edge: &Edge) -> StoreResult<()> {
        let cf = column_family(self.db, CF_EDGES)?;
        let key = PersistentStorage::edge_key(edge.owner, edge.peer);
        self.txn.put_cf(&cf, key, encode_edge(edge)?)?;
        Ok(())
    }
}

impl StoreTransaction for RocksTx<'_> {
    fn get_for_update(&mut self, owner: UserId, peer: UserId) -> StoreResult<Option<Edge>> {
        self.read_locked(owner, peer)
    }

    fn upsert(&mut self, edge: Edge) -> StoreResult<Edge> {
        let existing = self.read_locked(edge.owner, edge.peer)?;
        let now = chrono::Utc::now().timestamp_millis();
        let stored = merge_upsert(existing.as_ref(), edge, now);
        self.write(&stored)?;
        Ok(stored)
    }

    fn update_flags(&mut self, owner: UserId, peer: UserId, delta: &EdgeDelta) -> StoreResult<u64> {
        let mut edge = match self.read_locked(owner, peer)? {
            Some(edge) => edge,
            None => return Ok(0),
        };

        edge.apply(delta);
        edge.updated_at = chrono::Utc::now().timestamp_millis();
        self.write(&edge)?;
        Ok(1)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.txn.commit()?;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.txn.rollback()?;
        Ok(())
    }
}
