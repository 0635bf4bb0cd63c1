use anyhow::{Context, Result};
use friendgraph::{
    AdjacencyMirror, ChannelMirror, Deadline, EdgeFilter, MemoryStore, PersistentStorage,
    RelationshipError, RelationshipService, RelationshipStore, ServiceConfig, Snowflake,
    SystemClock, UserDirectory, UserId, UserProfile,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => ServiceConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("friendgraph v{}", friendgraph::version());
    println!("==========================================");
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();

    let users = [
        UserProfile::new(UserId::new(1), "Alice").with_email("alice@example.com"),
        UserProfile::new(UserId::new(2), "Bob").with_email("bob@example.com"),
        UserProfile::new(UserId::new(3), "Carol"),
    ];

    let persistent = match &config.storage.data_path {
        Some(path) => {
            let storage = PersistentStorage::open(path, config.storage.lock_timeout_ms)
                .with_context(|| format!("failed to open storage at {}", path))?;
            for user in &users {
                storage.put_user(user)?;
            }
            Some(Arc::new(storage))
        }
        None => None,
    };

    let store: Arc<dyn RelationshipStore>;
    let directory: Arc<dyn UserDirectory>;
    match &persistent {
        Some(storage) => {
            store = storage.clone();
            directory = storage.clone();
        }
        None => {
            let memory = Arc::new(MemoryStore::new());
            for user in &users {
                memory.put_user(user.clone());
            }
            store = memory.clone();
            directory = memory;
        }
    }

    let generator = Snowflake::with_clock(
        config.ids.node_id,
        config.ids.epoch_ms,
        config.ids.clock_tolerance_ms,
        SystemClock,
    )?;

    let (mirror, receiver) = ChannelMirror::new();
    let adjacency = Arc::new(AdjacencyMirror::new());
    let consumer = tokio::spawn(Arc::clone(&adjacency).run(receiver));

    let service = RelationshipService::new(
        store,
        directory,
        Arc::new(generator),
        Arc::new(mirror),
        &config,
    );

    run_scenario(&service)?;

    // Dropping the service closes the mirror channel and stops the consumer
    drop(service);
    consumer.await?;

    println!("\nMirror view:");
    for user in &users {
        println!(
            "  {} friends={:?} blacklist={:?}",
            user.display_name,
            adjacency.friends_of(user.id),
            adjacency.blacklist_of(user.id)
        );
    }

    if let Some(storage) = persistent {
        match Arc::try_unwrap(storage) {
            Ok(storage) => storage.close(),
            Err(_) => warn!("Storage still shared at shutdown; leaving it to drop"),
        }
    }

    info!("Done");
    Ok(())
}

fn run_scenario(service: &RelationshipService) -> Result<()> {
    let alice = UserId::new(1);
    let bob = UserId::new(2);
    let carol = UserId::new(3);

    println!("=== Friend requests ===");
    report(
        "Alice -> Bob (coworker)",
        service.request_friend(alice, bob, "coworker", service.default_deadline()),
    );
    report(
        "Bob accepts Alice",
        service.respond_to_request(bob, alice, "met at work", true, service.default_deadline()),
    );
    report(
        "Carol -> Alice",
        service.request_friend(carol, alice, "", service.default_deadline()),
    );
    report(
        "Alice rejects Carol",
        service.respond_to_request(alice, carol, "", false, service.default_deadline()),
    );
    report(
        "Carol -> Alice again",
        service.request_friend(carol, alice, "please", Deadline::none()),
    );

    println!("\n=== Blacklist ===");
    report("Alice blocks Bob", service.set_block(alice, bob, true, service.default_deadline()));
    report("Alice blocks Bob again", service.set_block(alice, bob, true, service.default_deadline()));

    println!("\n=== Listings ===");
    for (name, user) in [("Alice", alice), ("Bob", bob)] {
        let friends = service.list_friends_with_profile(user)?;
        println!("  {} sees {} friend(s):", name, friends.len());
        for entry in friends {
            println!(
                "    {} note={:?} blocked={}",
                entry.profile.display_name, entry.note, entry.blocked
            );
        }
    }
    println!("  Alice's blacklist: {:?}", service.blacklist_ids(alice)?);
    println!(
        "  Alice's rows: {}",
        serde_json::to_string(&service.list_edges(alice, &EdgeFilter::any())?)?
    );

    Ok(())
}

fn report<T: std::fmt::Debug>(label: &str, result: Result<T, RelationshipError>) {
    match result {
        Ok(value) => println!("  ✓ {}: {:?}", label, value),
        Err(err) => println!("  ✗ {}: {} [{}]", label, err, err.class()),
    }
}
