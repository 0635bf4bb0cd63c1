//! Shared fixtures for the integration tests

#![allow(dead_code)]

use friendgraph::{
    GraphMirror, MemoryStore, NoopMirror, PersistentStorage, RelationshipService,
    SequenceGenerator, ServiceConfig, Snowflake, UserId, UserProfile,
};
use std::path::Path;
use std::sync::Arc;

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);
pub const CAROL: UserId = UserId(3);
pub const DAVE: UserId = UserId(4);

pub fn profiles() -> Vec<UserProfile> {
    vec![
        UserProfile::new(ALICE, "Alice").with_email("alice@example.com"),
        UserProfile::new(BOB, "Bob").with_email("bob@example.com"),
        UserProfile::new(CAROL, "Carol"),
        UserProfile::new(DAVE, "Dave").with_avatar("avatars/dave.png"),
    ]
}

pub fn memory_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for profile in profiles() {
        store.put_user(profile);
    }
    store
}

pub fn memory_service_with_mirror(
    mirror: Arc<dyn GraphMirror>,
) -> (Arc<MemoryStore>, RelationshipService) {
    let store = memory_store();
    let service = RelationshipService::new(
        store.clone(),
        store.clone(),
        Arc::new(SequenceGenerator::new(1000)),
        mirror,
        &ServiceConfig::default(),
    );
    (store, service)
}

pub fn memory_service() -> (Arc<MemoryStore>, RelationshipService) {
    memory_service_with_mirror(Arc::new(NoopMirror))
}

pub fn open_rocks(path: &Path) -> Arc<PersistentStorage> {
    let storage = PersistentStorage::open(path, 1000).unwrap();
    for profile in profiles() {
        storage.put_user(&profile).unwrap();
    }
    Arc::new(storage)
}

pub fn rocks_service(storage: &Arc<PersistentStorage>) -> RelationshipService {
    RelationshipService::new(
        storage.clone(),
        storage.clone(),
        Arc::new(Snowflake::new(1).unwrap()),
        Arc::new(NoopMirror),
        &ServiceConfig::default(),
    )
}
