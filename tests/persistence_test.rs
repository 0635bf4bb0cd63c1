//! Integration tests for the RocksDB-backed store
//!
//! Verifies the relationship scenarios on disk, id stability across reopen,
//! and lock-timeout behaviour of pessimistic transactions.

mod common;

use common::{open_rocks, rocks_service, ALICE, BOB, CAROL, DAVE};
use friendgraph::{
    Deadline, EdgeFilter, EdgeState, PersistentStorage, RelationshipError, RelationshipStore,
    UserDirectory,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_scenarios_on_rocksdb() {
    let temp_dir = TempDir::new().unwrap();
    let storage = open_rocks(temp_dir.path());
    let service = rocks_service(&storage);

    let first = service.request_friend(ALICE, BOB, "coworker", Deadline::none()).unwrap();
    let second = service.request_friend(ALICE, BOB, "coworker", Deadline::none()).unwrap();
    assert_eq!(first, second);
    assert_eq!(storage.query(ALICE, &EdgeFilter::any()).unwrap().len(), 1);

    service.respond_to_request(BOB, ALICE, "", true, Deadline::none()).unwrap();
    assert!(service.get_edge(ALICE, BOB).unwrap().unwrap().accepted);
    assert!(service.get_edge(BOB, ALICE).unwrap().unwrap().accepted);

    service.set_block(ALICE, BOB, true, Deadline::none()).unwrap();
    assert!(matches!(
        service.set_block(ALICE, BOB, true, Deadline::none()),
        Err(RelationshipError::NoChange)
    ));

    let bobs = service.list_friends_with_profile(BOB).unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].profile.email, "alice@example.com");

    service.request_friend(CAROL, DAVE, "", Deadline::none()).unwrap();
    service.respond_to_request(DAVE, CAROL, "", false, Deadline::none()).unwrap();
    assert!(matches!(
        service.request_friend(CAROL, DAVE, "", Deadline::none()),
        Err(RelationshipError::Blocked(_))
    ));

    // Unfriend needs both rows
    service.request_friend(ALICE, CAROL, "", Deadline::none()).unwrap();
    assert!(matches!(
        service.unfriend(ALICE, CAROL, Deadline::none()),
        Err(RelationshipError::NoEdge { .. })
    ));
    assert!(!service.get_edge(ALICE, CAROL).unwrap().unwrap().deleted);
}

#[test]
fn test_reopen_preserves_rows_and_ids() {
    let temp_dir = TempDir::new().unwrap();

    let original = {
        let storage = open_rocks(temp_dir.path());
        let service = rocks_service(&storage);

        let id = service.request_friend(ALICE, BOB, "x", Deadline::none()).unwrap();
        service.respond_to_request(BOB, ALICE, "", true, Deadline::none()).unwrap();
        service.unfriend(BOB, ALICE, Deadline::none()).unwrap();

        drop(service);
        Arc::try_unwrap(storage).ok().unwrap().close();
        id
    };

    let storage = Arc::new(PersistentStorage::open(temp_dir.path(), 1000).unwrap());
    assert!(storage.exists(ALICE).unwrap());

    let service = rocks_service(&storage);
    let ab = service.get_edge(ALICE, BOB).unwrap().unwrap();
    assert_eq!(ab.id, original);
    assert_eq!(ab.state(), EdgeState::Deleted);
    assert_eq!(ab.note, "x");

    // Revive after reopen keeps the id minted before the restart
    let revived = service.request_friend(ALICE, BOB, "again", Deadline::none()).unwrap();
    assert_eq!(revived, original);
    assert_eq!(
        service.get_edge(ALICE, BOB).unwrap().unwrap().state(),
        EdgeState::Pending
    );
}

#[test]
fn test_listing_ordered_and_scoped() {
    let temp_dir = TempDir::new().unwrap();
    let storage = open_rocks(temp_dir.path());
    let service = rocks_service(&storage);

    let d = service.request_friend(ALICE, DAVE, "", Deadline::none()).unwrap();
    let b = service.request_friend(ALICE, BOB, "", Deadline::none()).unwrap();
    service.request_friend(BOB, CAROL, "", Deadline::none()).unwrap();

    let ids: Vec<_> = service
        .list_edges(ALICE, &EdgeFilter::any())
        .unwrap()
        .into_iter()
        .map(|edge| edge.id)
        .collect();
    assert_eq!(ids, vec![d, b]);
    assert_eq!(service.list_edges(BOB, &EdgeFilter::pending()).unwrap().len(), 1);
}

#[test]
fn test_concurrent_transaction_times_out() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(PersistentStorage::open(temp_dir.path(), 50).unwrap());
    for profile in common::profiles() {
        storage.put_user(&profile).unwrap();
    }
    let service = rocks_service(&storage);

    // Hold the row lock on (Alice, Bob) in a foreign transaction
    let mut holder = storage.begin().unwrap();
    holder.get_for_update(ALICE, BOB).unwrap();

    let err = service
        .request_friend(ALICE, BOB, "", Deadline::none())
        .unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {}", err);

    holder.rollback().unwrap();
    service.request_friend(ALICE, BOB, "", Deadline::none()).unwrap();
}

#[test]
fn test_lock_wait_past_deadline_is_timed_out() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(PersistentStorage::open(temp_dir.path(), 300).unwrap());
    for profile in common::profiles() {
        storage.put_user(&profile).unwrap();
    }
    let service = rocks_service(&storage);

    let mut holder = storage.begin().unwrap();
    holder.get_for_update(ALICE, BOB).unwrap();

    let err = service
        .request_friend(ALICE, BOB, "", Deadline::after(Duration::from_millis(20)))
        .unwrap_err();
    assert!(matches!(err, RelationshipError::TimedOut), "unexpected error: {}", err);
    assert!(err.is_retryable());

    holder.rollback().unwrap();
    assert!(service.get_edge(ALICE, BOB).unwrap().is_none());
}
