//! Premarket promotion: watch announced-but-unreleased gifts and hand them
//! to the supervisor once their first page goes live.
//!
//! Promoted gifts are written to the ledger together with the sequence they
//! were given, so a restart walks them again without a second announcement.

use crate::checkpoint::write_json_atomic;
use crate::config::EngineConfig;
use crate::dispatch::SenderPool;
use crate::gate::FetchGate;
use crate::supervisor::{next_id, sleep_or_stop, SequenceEvent};
use crate::types::{EngineError, EngineResult, FetchError, Sequence, SequenceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Default location of live gift pages.
pub const DEFAULT_BASE_URL: &str = "https://t.me/nft/";

const PAUSE_BETWEEN_NAMES: Duration = Duration::from_secs(1);
const PAUSE_AFTER_FAILURE: Duration = Duration::from_secs(2);
const PASS_FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// URL slug of a gift name: lowercase, spaces become dashes.
pub fn slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// A ledger entry. Older ledgers stored a bare `true`: the gift was announced
/// but its sequence was never saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum LedgerEntry {
    Registered(Sequence),
    Announced(bool),
}

/// Promoted gifts, persisted as
/// `{ "Swag Bag": { "id": 5, "base_url": "https://t.me/nft/swag-bag-", "label": "Swag Bag" } }`.
pub struct PremarketLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl PremarketLedger {
    /// Load from `path`. Missing or unreadable files start empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                tracing::warn!("premarket ledger {} unreadable: {e}", path.display());
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("premarket ledger {} unreadable: {e}", path.display());
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `name` was promoted and its sequence is known.
    pub fn contains(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(LedgerEntry::Registered(_)))
    }

    /// Whether a promotion of `name` was ever announced.
    pub fn announced(&self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(LedgerEntry::Registered(_)) => true,
            Some(LedgerEntry::Announced(flag)) => *flag,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Promoted sequences, ordered by id.
    pub fn sequences(&self) -> Vec<Sequence> {
        let mut sequences: Vec<Sequence> = self
            .entries
            .values()
            .filter_map(|entry| match entry {
                LedgerEntry::Registered(sequence) => Some(sequence.clone()),
                LedgerEntry::Announced(_) => None,
            })
            .collect();
        sequences.sort_by_key(|s| s.id);
        sequences
    }

    /// Append the promoted sequences to a startup set. Entries whose id or
    /// base URL is already taken are skipped.
    pub fn restore_into(&self, sequences: &mut Vec<Sequence>) -> usize {
        let mut restored = 0;
        for sequence in self.sequences() {
            let clash = sequences
                .iter()
                .find(|s| s.id == sequence.id || s.base_url == sequence.base_url);
            match clash {
                Some(existing) if existing.base_url == sequence.base_url => {}
                Some(existing) => tracing::warn!(
                    "premarket gift {} keeps id {} which now belongs to {}, not restored",
                    sequence.label,
                    sequence.id,
                    existing.label
                ),
                None => {
                    sequences.push(sequence);
                    restored += 1;
                }
            }
        }
        restored
    }

    /// Record the sequence `name` was promoted to and persist.
    pub fn record(&mut self, name: &str, sequence: &Sequence) -> EngineResult<()> {
        self.entries
            .insert(name.to_string(), LedgerEntry::Registered(sequence.clone()));
        write_json_atomic(&self.path, &self.entries)
    }

    fn max_id(&self) -> Option<SequenceId> {
        self.sequences().iter().map(|s| s.id).max()
    }
}

pub struct PremarketScan {
    names: Vec<String>,
    gate: Arc<FetchGate>,
    pool: Arc<SenderPool>,
    ledger: PremarketLedger,
    base_url: String,
    interval: Duration,
    next_id: SequenceId,
}

impl PremarketScan {
    pub fn new(
        names: Vec<String>,
        gate: Arc<FetchGate>,
        pool: Arc<SenderPool>,
        ledger: PremarketLedger,
        config: &EngineConfig,
    ) -> Self {
        let next_id = ledger.max_id().map_or(SequenceId(1), SequenceId::next);
        Self {
            names,
            gate,
            pool,
            ledger,
            base_url: DEFAULT_BASE_URL.to_string(),
            interval: config.premarket_interval,
            next_id,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Keep promoted ids clear of every sequence in `sequences`.
    pub fn reserve_ids(&mut self, sequences: &[Sequence]) {
        self.next_id = self.next_id.max(next_id(sequences));
    }

    /// Names still waiting for release.
    pub fn waiting(&self) -> Vec<&str> {
        self.names
            .iter()
            .filter(|name| !self.ledger.contains(name))
            .map(String::as_str)
            .collect()
    }

    /// Base URL a promoted sequence walks, e.g. `https://t.me/nft/swag-bag-`.
    pub fn sequence_base(&self, name: &str) -> String {
        format!("{}{}-", self.base_url, slug(name))
    }

    /// Whether `name` has a live first page with a non-zero issued counter.
    pub async fn check(&self, name: &str) -> Result<bool, FetchError> {
        let url = format!("{}1", self.sequence_base(name));
        match self.gate.fetch_once(&url).await? {
            Some(record) => Ok(record.issued.map_or(true, |count| count.issued != 0)),
            None => Ok(false),
        }
    }

    /// One pass over the waiting names. Returns how many were promoted.
    ///
    /// Stops before the next name once `shutdown` is set. Fails only if every
    /// check in the pass failed, or the supervisor is gone.
    pub async fn scan_once(
        &mut self,
        events: &mpsc::Sender<SequenceEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> EngineResult<usize> {
        let waiting: Vec<String> = self.waiting().into_iter().map(str::to_string).collect();
        let mut promoted = 0;
        let mut checked = 0;
        let mut failures = 0;

        for name in &waiting {
            if *shutdown.borrow() {
                break;
            }
            let result = self.check(name).await;
            checked += 1;
            let pause = match result {
                Ok(true) if !*shutdown.borrow() => {
                    self.promote(name, events).await?;
                    promoted += 1;
                    PAUSE_BETWEEN_NAMES
                }
                Ok(_) => PAUSE_BETWEEN_NAMES,
                Err(e) => {
                    failures += 1;
                    tracing::debug!("premarket check for {name} failed: {e}");
                    PAUSE_AFTER_FAILURE
                }
            };
            if sleep_or_stop(pause, shutdown).await {
                break;
            }
        }

        if checked > 0 && failures == checked {
            return Err(EngineError::Unavailable(format!(
                "all {failures} premarket check(s) failed"
            )));
        }
        Ok(promoted)
    }

    async fn promote(&mut self, name: &str, events: &mpsc::Sender<SequenceEvent>) -> EngineResult<()> {
        let sequence = Sequence::new(self.next_id, self.sequence_base(name), name);
        self.next_id = self.next_id.next();
        tracing::info!(sequence = %sequence.id, "premarket gift {name} is live");

        if !self.ledger.announced(name)
            && !self.pool.announce(&format!("🎁 {name} added to the watch pool")).await
        {
            tracing::warn!("could not announce promotion of {name}");
        }
        if let Err(e) = self.ledger.record(name, &sequence) {
            tracing::warn!("failed to persist premarket ledger: {e}");
        }
        events
            .send(SequenceEvent::Promoted(sequence))
            .await
            .map_err(|e| EngineError::ChannelClosed(e.to_string()))
    }

    /// Scan every interval until shutdown or until nothing is left to watch.
    pub async fn run(mut self, events: mpsc::Sender<SequenceEvent>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "premarket scan started ({} name(s), every {:?})",
            self.waiting().len(),
            self.interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.waiting().is_empty() {
                tracing::info!("premarket scan has nothing left to watch");
                break;
            }

            let pause = match self.scan_once(&events, &mut shutdown).await {
                Ok(promoted) => {
                    if promoted > 0 {
                        tracing::info!("premarket pass promoted {promoted} gift(s)");
                    }
                    self.interval
                }
                Err(EngineError::ChannelClosed(_)) => break,
                Err(e) => {
                    tracing::error!("premarket pass failed: {e}");
                    PASS_FAILURE_BACKOFF
                }
            };

            if sleep_or_stop(pause, &mut shutdown).await {
                break;
            }
        }
        tracing::info!("premarket scan stopped");
    }
}
