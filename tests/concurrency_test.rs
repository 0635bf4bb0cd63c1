//! Concurrency tests
//!
//! Same-pair operations must serialize; ids must stay unique under contention.

mod common;

use common::{memory_service, open_rocks, rocks_service, ALICE, BOB, CAROL, DAVE};
use friendgraph::{
    Deadline, EdgeFilter, IdGenerator, RelationshipError, RelationshipService, Snowflake,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn race_identical_requests(service: Arc<RelationshipService>) {
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service
                    .request_friend(ALICE, BOB, "hi", Deadline::none())
                    .unwrap()
            })
        })
        .collect();

    let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1, "every caller must see the same edge id");
    assert_eq!(service.list_edges(ALICE, &EdgeFilter::any()).unwrap().len(), 1);
}

#[test]
fn test_concurrent_identical_requests_memory() {
    let (store, service) = memory_service();
    race_identical_requests(Arc::new(service));
    assert_eq!(store.edge_count(), 1);
}

#[test]
fn test_concurrent_identical_requests_rocksdb() {
    let temp_dir = TempDir::new().unwrap();
    let storage = open_rocks(temp_dir.path());
    race_identical_requests(Arc::new(rocks_service(&storage)));
}

#[test]
fn test_racing_accepts_only_one_wins() {
    let (_store, service) = memory_service();
    service.request_friend(ALICE, BOB, "", Deadline::none()).unwrap();
    let service = Arc::new(service);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.respond_to_request(BOB, ALICE, "", true, Deadline::none()))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for result in results.into_iter().filter(|r| r.is_err()) {
        // Losers see the committed acceptance, not a half-written pair
        assert!(matches!(result, Err(RelationshipError::AlreadyFriends(_))));
    }
    assert!(service.get_edge(ALICE, BOB).unwrap().unwrap().accepted);
    assert!(service.get_edge(BOB, ALICE).unwrap().unwrap().accepted);
}

#[test]
fn test_disjoint_pairs_in_parallel_rocksdb() {
    let temp_dir = TempDir::new().unwrap();
    let storage = open_rocks(temp_dir.path());
    let service = Arc::new(rocks_service(&storage));

    let pairs = [(ALICE, BOB), (CAROL, DAVE), (ALICE, CAROL), (BOB, DAVE)];
    let handles: Vec<_> = pairs
        .iter()
        .map(|&(from, to)| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.request_friend(from, to, "", Deadline::none()).unwrap();
                service.respond_to_request(to, from, "", true, Deadline::none()).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut alice_friends = service.friend_ids(ALICE).unwrap();
    alice_friends.sort();
    assert_eq!(alice_friends, vec![BOB, CAROL]);
    assert_eq!(service.friend_ids(DAVE).unwrap().len(), 2);
}

#[test]
fn test_snowflake_unique_across_threads() {
    let generator = Arc::new(Snowflake::new(9).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || {
                (0..5_000)
                    .map(|_| generator.generate().unwrap().as_u64())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "duplicate id {}", id);
        }
    }
    assert_eq!(seen.len(), 40_000);
}
