//! Dispatch fanout: interchangeable senders behind a per-sequence throttle.

use crate::types::{truncate_message, DeliveryError, Discovery, EngineError, EngineResult};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Longest error text written to the log for a failed delivery.
const LOGGED_ERROR_CHARS: usize = 100;

/// One delivery handle to the notification sink.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Verify the handle works. Returns a display identity on success.
    async fn health_check(&self) -> Result<String, DeliveryError>;

    /// Deliver a formatted discovery notification.
    async fn deliver(&self, discovery: &Discovery) -> Result<(), DeliveryError>;

    /// Deliver a plain text notice.
    async fn announce(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Senders that passed their startup health check.
pub struct SenderPool {
    senders: Vec<Arc<dyn Sender>>,
}

impl SenderPool {
    /// Health-check every candidate once. Failing handles are dropped for
    /// the life of the process; an empty result is fatal.
    pub async fn initialize(candidates: Vec<Arc<dyn Sender>>) -> EngineResult<Self> {
        let total = candidates.len();
        tracing::info!("initializing {total} sender(s)");

        let mut senders = Vec::with_capacity(total);
        for (i, sender) in candidates.into_iter().enumerate() {
            match sender.health_check().await {
                Ok(identity) => {
                    tracing::info!("sender {}: {identity} ready", i + 1);
                    senders.push(sender);
                }
                Err(e) => {
                    tracing::error!("sender {} ({}) failed health check: {e}", i + 1, sender.name());
                }
            }
        }

        if senders.is_empty() {
            return Err(EngineError::NoSenders);
        }
        tracing::info!("{} of {total} sender(s) live", senders.len());
        Ok(Self { senders })
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    fn pick(&self) -> Option<Arc<dyn Sender>> {
        self.senders.choose(&mut rand::thread_rng()).cloned()
    }

    /// Try senders in order until one delivers `text`.
    pub async fn announce(&self, text: &str) -> bool {
        for sender in &self.senders {
            match sender.announce(text).await {
                Ok(()) => return true,
                Err(e) => tracing::warn!("announce via {} failed: {e}", sender.name()),
            }
        }
        false
    }

    /// A dispatch lane for one sequence.
    pub fn lane(self: &Arc<Self>, min_interval: Duration) -> DispatchLane {
        DispatchLane {
            pool: Arc::clone(self),
            min_interval,
            last_sent: None,
        }
    }
}

/// Per-sequence dispatch path. Owns the throttle token for its sequence, so
/// no last-send state is shared between sequences.
pub struct DispatchLane {
    pool: Arc<SenderPool>,
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl DispatchLane {
    /// Deliver through one randomly chosen sender.
    ///
    /// Blocks until the minimum interval since this lane's last successful
    /// dispatch has elapsed. A failure is reported, never retried here.
    pub async fn dispatch(&mut self, discovery: &Discovery) -> bool {
        if let Some(last) = self.last_sent {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        let Some(sender) = self.pool.pick() else {
            tracing::error!("no senders available");
            return false;
        };

        match sender.deliver(discovery).await {
            Ok(()) => {
                self.last_sent = Some(Instant::now());
                tracing::info!(
                    sequence = %discovery.sequence,
                    index = discovery.index,
                    sender = sender.name(),
                    "[{}] sent gift #{}",
                    discovery.label,
                    discovery.index
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    sequence = %discovery.sequence,
                    index = discovery.index,
                    sender = sender.name(),
                    "[{}] dispatch failed: {}",
                    discovery.label,
                    truncate_message(&e.to_string(), LOGGED_ERROR_CHARS)
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GiftRecord, Sequence, SequenceId};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recording {
        name: String,
        healthy: bool,
        failing: AtomicBool,
        delivered: Mutex<Vec<(u64, Instant)>>,
        announced: AtomicUsize,
    }

    impl Recording {
        fn new(name: &str, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                healthy,
                failing: AtomicBool::new(false),
                delivered: Mutex::new(Vec::new()),
                announced: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Sender for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        async fn health_check(&self) -> Result<String, DeliveryError> {
            if self.healthy {
                Ok(format!("@{}", self.name))
            } else {
                Err(DeliveryError::Rejected("Unauthorized".to_string()))
            }
        }

        async fn deliver(&self, discovery: &Discovery) -> Result<(), DeliveryError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeliveryError::Transport("x".repeat(500)));
            }
            self.delivered
                .lock()
                .unwrap()
                .push((discovery.index, Instant::now()));
            Ok(())
        }

        async fn announce(&self, _text: &str) -> Result<(), DeliveryError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeliveryError::Transport("down".to_string()));
            }
            self.announced.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn discovery(index: u64) -> Discovery {
        let seq = Sequence::new(SequenceId(1), "https://t.me/nft/swagbag-", "Swag Bag");
        Discovery::new(&seq, index, GiftRecord::default())
    }

    #[tokio::test]
    async fn test_unhealthy_senders_are_excluded() {
        let good = Recording::new("good", true);
        let bad = Recording::new("bad", false);
        let pool = SenderPool::initialize(vec![bad.clone(), good.clone()])
            .await
            .unwrap();
        assert_eq!(pool.len(), 1);

        let pool = Arc::new(pool);
        let mut lane = pool.lane(Duration::ZERO);
        for i in 0..5 {
            assert!(lane.dispatch(&discovery(i)).await);
        }
        assert_eq!(good.delivered.lock().unwrap().len(), 5);
        assert!(bad.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_healthy_sender_is_fatal() {
        let result = SenderPool::initialize(vec![Recording::new("bad", false)]).await;
        assert!(matches!(result, Err(EngineError::NoSenders)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lane_enforces_min_interval() {
        let sender = Recording::new("only", true);
        let pool = Arc::new(SenderPool::initialize(vec![sender.clone()]).await.unwrap());
        let mut lane = pool.lane(Duration::from_millis(100));

        assert!(lane.dispatch(&discovery(1)).await);
        assert!(lane.dispatch(&discovery(2)).await);
        assert!(lane.dispatch(&discovery(3)).await);

        let delivered = sender.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 3);
        for pair in delivered.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lanes_do_not_throttle_each_other() {
        let sender = Recording::new("only", true);
        let pool = Arc::new(SenderPool::initialize(vec![sender.clone()]).await.unwrap());
        let mut first = pool.lane(Duration::from_secs(10));
        let mut second = pool.lane(Duration::from_secs(10));

        let start = Instant::now();
        assert!(first.dispatch(&discovery(1)).await);
        assert!(second.dispatch(&discovery(1)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_retried() {
        let sender = Recording::new("flaky", true);
        let pool = Arc::new(SenderPool::initialize(vec![sender.clone()]).await.unwrap());
        sender.failing.store(true, Ordering::SeqCst);

        let mut lane = pool.lane(Duration::ZERO);
        assert!(!lane.dispatch(&discovery(9)).await);
        assert!(sender.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_announce_falls_through_to_next_sender() {
        let first = Recording::new("first", true);
        let second = Recording::new("second", true);
        let pool = SenderPool::initialize(vec![first.clone(), second.clone()])
            .await
            .unwrap();
        first.failing.store(true, Ordering::SeqCst);

        assert!(pool.announce("new gift").await);
        assert_eq!(second.announced.load(Ordering::SeqCst), 1);
    }
}
