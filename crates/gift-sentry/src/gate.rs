//! Fetch gate: bounded-concurrency, timeout-and-retry wrapper around a
//! single page probe.
//!
//! All probes in the process share one semaphore, so no sequence can starve
//! the others of network capacity. Retries happen outside the permit.

use crate::config::EngineConfig;
use crate::types::{EngineError, EngineResult, FetchError, GiftRecord, Index, Sequence};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Fetch-and-extract collaborator for one URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// `Ok(None)` means the page exists but carries no gift (or returned 404).
    async fn fetch(&self, url: &str) -> Result<Option<GiftRecord>, FetchError>;
}

/// Result of a probe after retries.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Hit(GiftRecord),
    Absent,
    /// Every attempt failed. Walkers treat this like [`ProbeOutcome::Absent`].
    Exhausted { attempts: u32, last_error: String },
}

impl ProbeOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Process-wide probe gate.
pub struct FetchGate {
    source: Arc<dyn PageSource>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    attempts: u32,
    retry_base: Duration,
}

impl FetchGate {
    pub fn new(source: Arc<dyn PageSource>, config: &EngineConfig) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(config.max_concurrent_probes.max(1))),
            timeout: config.probe_timeout,
            attempts: config.probe_attempts.max(1),
            retry_base: config.retry_base,
        }
    }

    /// Probe `sequence` at `index`, retrying failures with a linear backoff.
    pub async fn probe(&self, sequence: &Sequence, index: Index) -> EngineResult<ProbeOutcome> {
        let url = sequence.url_for(index);
        let mut last_error = String::new();

        for attempt in 0..self.attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_base * attempt).await;
            }
            match self.fetch_once(&url).await {
                Ok(Some(record)) => return Ok(ProbeOutcome::Hit(record)),
                Ok(None) => return Ok(ProbeOutcome::Absent),
                Err(FetchError::GateClosed) => return Err(EngineError::GateClosed),
                Err(e) => {
                    tracing::debug!(
                        sequence = %sequence.id,
                        index,
                        attempt = attempt + 1,
                        "probe failed: {e}"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Ok(ProbeOutcome::Exhausted {
            attempts: self.attempts,
            last_error,
        })
    }

    /// One attempt under the shared permit and timeout, no retry.
    pub async fn fetch_once(&self, url: &str) -> Result<Option<GiftRecord>, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::GateClosed)?;
        match tokio::time::timeout(self.timeout, self.source.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }

    /// Permits not currently held by an in-flight probe.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Refuse all further probes.
    pub fn close(&self) {
        self.permits.close();
    }
}
