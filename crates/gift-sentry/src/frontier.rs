//! Frontier estimator: where does a sequence currently end?
//!
//! Two tiers. The cheap one reads the issued counter printed on the page at
//! a fixed low index. When that is unavailable the index space is
//! binary-searched, stopping at coarse granularity since the walker closes
//! the remaining gap linearly. Positive results are cached per sequence.

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::gate::FetchGate;
use crate::types::{Index, Sequence, SequenceId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Index whose page carries the issued counter.
pub const DIRECT_SIGNAL_INDEX: Index = 1;

/// Outcome of one binary search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchReport {
    /// Highest index that answered with a gift.
    pub last_found: Option<Index>,
    /// Probes issued during the search.
    pub probes: u32,
}

pub struct FrontierEstimator {
    gate: Arc<FetchGate>,
    cache: Mutex<TtlCache<SequenceId, Index>>,
    low: Index,
    high: Index,
    granularity: Index,
    pacing: Duration,
}

impl FrontierEstimator {
    pub fn new(gate: Arc<FetchGate>, config: &EngineConfig) -> Self {
        Self {
            gate,
            cache: Mutex::new(TtlCache::new(
                config.frontier_ttl,
                config.frontier_cache_capacity,
            )),
            low: config.search_low.max(1),
            high: config.search_high,
            granularity: config.search_granularity,
            pacing: config.search_pacing,
        }
    }

    /// Believed upper bound of populated indices, or `None` if unknown.
    pub async fn estimate(&self, sequence: &Sequence) -> Option<Index> {
        if let Some(cached) = self.cached(sequence.id).await {
            return Some(cached);
        }

        let estimate = match self.direct_signal(sequence).await {
            Some(issued) => Some(issued),
            None => self.binary_search(sequence).await.last_found,
        };

        match estimate {
            Some(value) => {
                tracing::debug!(sequence = %sequence.id, value, "frontier estimated");
                self.cache.lock().await.insert(sequence.id, value);
            }
            None => {
                tracing::debug!(sequence = %sequence.id, "frontier unknown");
            }
        }
        estimate
    }

    /// Cached estimate, if still fresh.
    pub async fn cached(&self, id: SequenceId) -> Option<Index> {
        self.cache.lock().await.get(&id)
    }

    async fn direct_signal(&self, sequence: &Sequence) -> Option<Index> {
        let url = sequence.url_for(DIRECT_SIGNAL_INDEX);
        match self.gate.fetch_once(&url).await {
            Ok(Some(record)) => record
                .issued
                .map(|count| count.issued)
                .filter(|issued| *issued > 0),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(sequence = %sequence.id, "issued counter unavailable: {e}");
                None
            }
        }
    }

    /// Coarse binary search for the last populated index.
    ///
    /// Any failed probe counts as "does not exist" and is never retried.
    pub async fn binary_search(&self, sequence: &Sequence) -> SearchReport {
        let mut low = self.low;
        let mut high = self.high;
        let mut last_found: Index = 0;
        let mut probes = 0u32;

        while low <= high && high - low > self.granularity {
            let mid = low + (high - low) / 2;
            probes += 1;
            let hit = matches!(
                self.gate.fetch_once(&sequence.url_for(mid)).await,
                Ok(Some(_))
            );
            if hit {
                last_found = mid;
                low = mid + 1;
            } else {
                high = mid - 1;
            }
            tokio::time::sleep(self.pacing).await;
        }

        tracing::debug!(
            sequence = %sequence.id,
            probes,
            last_found,
            "frontier binary search finished"
        );
        SearchReport {
            last_found: (last_found > 0).then_some(last_found),
            probes,
        }
    }
}
