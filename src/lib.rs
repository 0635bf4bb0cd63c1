//! friendgraph
//!
//! Social-graph relationship engine for a private instant messaging backend:
//! friend requests, accept/reject, blacklists, soft-deleted friendships and
//! private notes, stored as directed edges keyed by (owner, peer), plus the
//! snowflake generator that mints their ids.
//!
//! # Architecture
//!
//! - [`id`]: time-ordered 64-bit id generation
//! - [`graph`]: edge model, change events and the adjacency mirror
//! - [`persistence`]: transactional stores (in-memory and RocksDB) and the user directory
//! - [`relationship`]: the relationship state machine
//! - [`config`]: YAML configuration with environment overrides
//!
//! ## Example Usage
//!
//! ```rust
//! use friendgraph::{
//!     Deadline, MemoryStore, NoopMirror, RelationshipService, SequenceGenerator,
//!     ServiceConfig, UserId, UserProfile,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.put_user(UserProfile::new(UserId::new(1), "Alice"));
//! store.put_user(UserProfile::new(UserId::new(2), "Bob"));
//!
//! let service = RelationshipService::new(
//!     store.clone(),
//!     store.clone(),
//!     Arc::new(SequenceGenerator::default()),
//!     Arc::new(NoopMirror),
//!     &ServiceConfig::default(),
//! );
//!
//! let alice = UserId::new(1);
//! let bob = UserId::new(2);
//! service.request_friend(alice, bob, "coworker", Deadline::none()).unwrap();
//! service.respond_to_request(bob, alice, "", true, Deadline::none()).unwrap();
//!
//! assert_eq!(service.friend_ids(alice).unwrap(), vec![bob]);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod graph;
pub mod id;
pub mod persistence;
pub mod relationship;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigResult, IdConfig, ServiceConfig, StorageConfig};

pub use graph::{
    AdjacencyMirror, ChannelMirror, Edge, EdgeDelta, EdgeEvent, EdgeEventKind, EdgeFilter,
    EdgeId, EdgeState, GraphMirror, MirrorError, MirrorResult, NoopMirror, UserId,
};

pub use id::{
    Clock, Id, IdError, IdGenerator, IdParts, IdResult, ManualClock, SequenceGenerator,
    Snowflake, SystemClock,
};

pub use persistence::{
    MemoryStore, PersistentStorage, RelationshipStore, StoreError, StoreResult, StoreTransaction,
    UserDirectory, UserProfile,
};

pub use relationship::{
    Deadline, ErrorClass, FriendEntry, RelationshipError, RelationshipResult, RelationshipService,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "0.1.0");
    }
}
