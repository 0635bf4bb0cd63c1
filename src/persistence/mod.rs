//! Persistence layer for the relationship engine
//!
//! - [`store`]: transactional store and user directory contracts
//! - [`memory`]: in-process store used by tests and embedded deployments
//! - [`storage`]: RocksDB-backed store with row-level pessimistic locking

pub mod memory;
pub mod storage;
pub mod store;

pub use memory::MemoryStore;
pub use storage::PersistentStorage;
pub use store::{
    RelationshipStore, StoreError, StoreResult, StoreTransaction, UserDirectory, UserProfile,
};
