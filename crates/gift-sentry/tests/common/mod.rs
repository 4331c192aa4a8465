//! Shared fakes for engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gift_sentry::{
    CheckpointLedger, CheckpointStore, DeliveryError, Discovery, EngineConfig, EngineHandles,
    FetchError, FetchGate, FrontierEstimator, GiftRecord, Index, IssuedCount, PageSource, Sender,
    SenderPool,
};

// ─────────────────────── pages ───────────────────────

/// In-memory site keyed by full URL.
#[derive(Default)]
pub struct FakePages {
    pages: Mutex<HashMap<String, GiftRecord>>,
    panic_once: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl FakePages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish a gift page at `base{index}`.
    pub fn publish(&self, base: &str, index: Index) {
        let url = format!("{base}{index}");
        self.pages.lock().unwrap().insert(
            url.clone(),
            GiftRecord {
                url,
                title: "Gift".to_string(),
                ..GiftRecord::default()
            },
        );
    }

    pub fn publish_range(&self, base: &str, indices: impl IntoIterator<Item = Index>) {
        for index in indices {
            self.publish(base, index);
        }
    }

    /// Publish page 1 carrying an issued counter.
    pub fn set_issued(&self, base: &str, issued: u64) {
        let url = format!("{base}1");
        self.pages.lock().unwrap().insert(
            url.clone(),
            GiftRecord {
                url,
                title: "Gift".to_string(),
                issued: Some(IssuedCount {
                    issued,
                    total: 100_000,
                }),
                ..GiftRecord::default()
            },
        );
    }

    /// The next fetch of `url` panics.
    pub fn panic_on(&self, url: &str) {
        self.panic_once.lock().unwrap().insert(url.to_string());
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl PageSource for FakePages {
    async fn fetch(&self, url: &str) -> Result<Option<GiftRecord>, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.panic_once.lock().unwrap().remove(url) {
            panic!("page source blew up on {url}");
        }
        Ok(self.pages.lock().unwrap().get(url).cloned())
    }
}

// ─────────────────────── senders ───────────────────────

#[derive(Default)]
pub struct FakeSender {
    failing: AtomicBool,
    delivered: Mutex<Vec<(u32, Index)>>,
    announcements: Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

impl FakeSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(sequence id, index)` pairs in delivery order.
    pub fn delivered(&self) -> Vec<(u32, Index)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_for(&self, sequence: u32) -> Vec<Index> {
        self.delivered()
            .into_iter()
            .filter(|(s, _)| *s == sequence)
            .map(|(_, i)| i)
            .collect()
    }

    pub fn announcements(&self) -> Vec<String> {
        self.announcements.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sender for FakeSender {
    fn name(&self) -> &str {
        "fake"
    }

    async fn health_check(&self) -> Result<String, DeliveryError> {
        Ok("@fake_bot".to_string())
    }

    async fn deliver(&self, discovery: &Discovery) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("sink unreachable".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((discovery.sequence.0, discovery.index));
        Ok(())
    }

    async fn announce(&self, text: &str) -> Result<(), DeliveryError> {
        self.announcements.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ─────────────────────── wiring ───────────────────────

/// Config for tests: frontier estimates are never cached.
pub fn uncached_config() -> EngineConfig {
    EngineConfig {
        frontier_ttl: std::time::Duration::ZERO,
        ..EngineConfig::default()
    }
}

pub async fn handles(
    pages: Arc<FakePages>,
    sender: Arc<FakeSender>,
    checkpoint_path: &Path,
    config: EngineConfig,
) -> EngineHandles {
    let config = Arc::new(config);
    let gate = Arc::new(FetchGate::new(pages, &config));
    let frontier = Arc::new(FrontierEstimator::new(Arc::clone(&gate), &config));
    let pool = SenderPool::initialize(vec![sender as Arc<dyn Sender>])
        .await
        .unwrap();
    EngineHandles {
        gate,
        frontier,
        pool: Arc::new(pool),
        ledger: CheckpointLedger::open(CheckpointStore::new(checkpoint_path)),
        config,
    }
}

pub fn write_checkpoints(path: &Path, entries: &[(u32, Index)]) {
    let map: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(id, index)| (id.to_string(), serde_json::json!(index)))
        .collect();
    std::fs::write(path, serde_json::to_string_pretty(&map).unwrap()).unwrap();
}

pub fn read_checkpoint(path: &Path, id: u32) -> Option<Index> {
    let raw = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    value.get(id.to_string())?.as_u64()
}
