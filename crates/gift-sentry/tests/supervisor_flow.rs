//! Supervisor lifecycle: concurrent walkers, promotion and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use gift_sentry::{
    EngineConfig, FetchError, PremarketLedger, PremarketScan, Sequence, SequenceId, Supervisor,
};
use tokio::time::Instant;

const PEPE: &str = "https://t.me/nft/plushpepe-";
const HAT: &str = "https://t.me/nft/jesterhat-";
const SWAG: &str = "https://t.me/nft/swag-bag-";

fn premarket_names() -> Vec<String> {
    vec!["Swag Bag".to_string(), "Jester Hat".to_string()]
}

#[tokio::test(start_paused = true)]
async fn test_walkers_run_concurrently_and_flush_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");
    write_checkpoints(&path, &[(1, 40), (2, 7)]);

    let pages = FakePages::new();
    pages.publish_range(PEPE, 41..=45);
    pages.publish_range(HAT, [8, 10]);
    let sender = FakeSender::new();
    let handles = handles(pages, sender.clone(), &path, EngineConfig::default()).await;

    let supervisor = Supervisor::new(
        handles,
        vec![
            Sequence::new(SequenceId(1), PEPE, "Plush Pepe"),
            Sequence::new(SequenceId(2), HAT, "Jester Hat"),
        ],
    );
    let checkpoints = supervisor
        .run(tokio::time::sleep(Duration::from_secs(30)))
        .await;

    assert_eq!(sender.delivered_for(1), vec![41, 42, 43, 44, 45]);
    assert_eq!(sender.delivered_for(2), vec![8, 10]);
    assert_eq!(checkpoints.get(&SequenceId(1)), Some(&45));
    assert_eq!(checkpoints.get(&SequenceId(2)), Some(&10));
    assert_eq!(read_checkpoint(&path, 1), Some(45));
    assert_eq!(read_checkpoint(&path, 2), Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_premarket_promotion_spawns_walker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");
    let ledger_path = dir.path().join("discovered_premarket.json");

    let pages = FakePages::new();
    pages.set_issued(SWAG, 2);
    pages.publish(SWAG, 3);
    pages.publish(PEPE, 1);
    let sender = FakeSender::new();
    let handles = handles(pages, sender.clone(), &path, EngineConfig::default()).await;

    let scan = PremarketScan::new(
        premarket_names(),
        Arc::clone(&handles.gate),
        Arc::clone(&handles.pool),
        PremarketLedger::load(&ledger_path),
        &handles.config,
    );
    let supervisor = Supervisor::new(
        handles,
        vec![Sequence::new(SequenceId(4), PEPE, "Plush Pepe")],
    )
    .with_premarket(scan);

    let checkpoints = supervisor
        .run(tokio::time::sleep(Duration::from_secs(30)))
        .await;

    assert_eq!(sender.announcements(), vec!["🎁 Swag Bag added to the watch pool"]);
    assert!(PremarketLedger::load(&ledger_path).contains("Swag Bag"));
    assert!(!PremarketLedger::load(&ledger_path).contains("Jester Hat"));

    // promoted under the next free id and walked from its frontier
    assert_eq!(sender.delivered_for(5), vec![3]);
    assert_eq!(checkpoints.get(&SequenceId(5)), Some(&3));
    assert_eq!(checkpoints.get(&SequenceId(4)), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_walker_is_respawned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");

    let pages = FakePages::new();
    pages.publish_range(PEPE, [2, 3]);
    pages.panic_on(&format!("{PEPE}2"));
    let sender = FakeSender::new();
    let handles = handles(pages.clone(), sender.clone(), &path, EngineConfig::default()).await;

    let supervisor = Supervisor::new(
        handles,
        vec![Sequence::new(SequenceId(1), PEPE, "Plush Pepe")],
    );
    let checkpoints = supervisor
        .run(tokio::time::sleep(Duration::from_secs(20)))
        .await;

    assert_eq!(pages.requests_for(&format!("{PEPE}2")), 2);
    assert_eq!(sender.delivered_for(1), vec![2, 3]);
    assert_eq!(checkpoints.get(&SequenceId(1)), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_with_no_history_writes_empty_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");

    let handles = handles(
        FakePages::new(),
        FakeSender::new(),
        &path,
        EngineConfig::default(),
    )
    .await;
    let supervisor = Supervisor::new(handles, Vec::new());
    let checkpoints = supervisor
        .run(tokio::time::sleep(Duration::from_millis(10)))
        .await;

    assert!(checkpoints.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
}

#[tokio::test(start_paused = true)]
async fn test_promoted_sequence_is_walked_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");
    let ledger_path = dir.path().join("discovered_premarket.json");

    let pages = FakePages::new();
    pages.set_issued(SWAG, 2);
    pages.publish(SWAG, 3);
    pages.publish(PEPE, 1);
    let sender = FakeSender::new();
    let catalog = vec![Sequence::new(SequenceId(4), PEPE, "Plush Pepe")];

    let first = handles(pages.clone(), sender.clone(), &path, EngineConfig::default()).await;
    let scan = PremarketScan::new(
        premarket_names(),
        Arc::clone(&first.gate),
        Arc::clone(&first.pool),
        PremarketLedger::load(&ledger_path),
        &first.config,
    );
    Supervisor::new(first, catalog.clone())
        .with_premarket(scan)
        .run(tokio::time::sleep(Duration::from_secs(30)))
        .await;
    assert_eq!(sender.delivered_for(5), vec![3]);

    pages.publish(SWAG, 4);

    let ledger = PremarketLedger::load(&ledger_path);
    let mut sequences = catalog;
    assert_eq!(ledger.restore_into(&mut sequences), 1);
    assert_eq!(sequences[1], Sequence::new(SequenceId(5), SWAG, "Swag Bag"));

    let second = handles(pages, sender.clone(), &path, EngineConfig::default()).await;
    let scan = PremarketScan::new(
        premarket_names(),
        Arc::clone(&second.gate),
        Arc::clone(&second.pool),
        ledger,
        &second.config,
    );
    assert_eq!(scan.waiting(), vec!["Jester Hat"]);
    let checkpoints = Supervisor::new(second, sequences)
        .with_premarket(scan)
        .run(tokio::time::sleep(Duration::from_secs(30)))
        .await;

    assert_eq!(sender.delivered_for(5), vec![3, 4]);
    assert_eq!(checkpoints.get(&SequenceId(5)), Some(&4));
    assert_eq!(sender.announcements().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_premarket_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");
    let ledger_path = dir.path().join("discovered_premarket.json");

    let handles = handles(
        FakePages::new(),
        FakeSender::new(),
        &path,
        EngineConfig::default(),
    )
    .await;
    let names: Vec<String> = (1..=30).map(|n| format!("Unreleased {n}")).collect();
    let scan = PremarketScan::new(
        names,
        Arc::clone(&handles.gate),
        Arc::clone(&handles.pool),
        PremarketLedger::load(&ledger_path),
        &handles.config,
    );

    let start = Instant::now();
    Supervisor::new(handles, Vec::new())
        .with_premarket(scan)
        .run(tokio::time::sleep(Duration::from_millis(500)))
        .await;

    assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_staggered_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");

    let config = EngineConfig {
        spawn_stagger: Duration::from_secs(1),
        ..EngineConfig::default()
    };
    let handles = handles(FakePages::new(), FakeSender::new(), &path, config).await;
    let sequences: Vec<Sequence> = (1..=40)
        .map(|id| Sequence::new(SequenceId(id), format!("https://t.me/nft/gift{id}-"), "Gift"))
        .collect();

    let start = Instant::now();
    Supervisor::new(handles, sequences)
        .run(tokio::time::sleep(Duration::from_millis(1500)))
        .await;

    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_fetch_gate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_found.json");

    let pages = FakePages::new();
    pages.publish(PEPE, 1);
    let handles = handles(pages, FakeSender::new(), &path, EngineConfig::default()).await;
    let gate = Arc::clone(&handles.gate);

    Supervisor::new(
        handles,
        vec![Sequence::new(SequenceId(1), PEPE, "Plush Pepe")],
    )
    .run(tokio::time::sleep(Duration::from_secs(5)))
    .await;

    assert!(matches!(
        gate.fetch_once(&format!("{PEPE}1")).await,
        Err(FetchError::GateClosed)
    ));
}
