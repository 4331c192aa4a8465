//! Sequence walker: the per-sequence state machine that advances an index
//! cursor, dispatches what it finds and keeps the cursor anchored to the
//! estimated frontier.
//!
//! ```text
//!   Seeding ──▶ Walking ──▶ CatchingUp ──┐
//!                  ▲  │                  │
//!                  │  └────▶ Rewinding ──┤
//!                  └─────────────────────┘
//! ```
//!
//! One call to [`Walker::step`] performs one unit of work: a seed, a single
//! probe (plus its dispatch), one dispatch retry, or one cursor jump.

use crate::checkpoint::CheckpointLedger;
use crate::config::EngineConfig;
use crate::dispatch::{DispatchLane, SenderPool};
use crate::frontier::FrontierEstimator;
use crate::gate::{FetchGate, ProbeOutcome};
use crate::types::{Discovery, EngineResult, Index, Sequence, SequenceId};
use std::sync::Arc;

/// Shared collaborators every walker needs.
#[derive(Clone)]
pub struct EngineHandles {
    pub gate: Arc<FetchGate>,
    pub frontier: Arc<FrontierEstimator>,
    pub pool: Arc<SenderPool>,
    pub ledger: CheckpointLedger,
    pub config: Arc<EngineConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerState {
    Seeding,
    Walking,
    /// The frontier is far ahead of the cursor.
    CatchingUp { estimate: Index },
    /// The cursor ran far past a frontier that stopped moving.
    Rewinding { estimate: Index },
}

/// What a single [`Walker::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Seeded { cursor: Index },
    Dispatched { index: Index },
    /// Found but not delivered; the same discovery is retried next step.
    DispatchFailed { index: Index },
    Missed { index: Index, exhausted: bool },
    CaughtUp { from: Index, to: Index },
    Rewound { from: Index, to: Index },
}

/// Starting cursor from the persisted checkpoint and a fresh estimate.
pub fn seed_cursor(checkpoint: Option<Index>, estimate: Option<Index>) -> Index {
    let estimate = estimate.filter(|e| *e > 0);
    match (checkpoint, estimate) {
        (Some(cp), Some(est)) => cp.max(est).saturating_add(1),
        (Some(cp), None) => cp.saturating_add(1),
        (None, Some(est)) => est.saturating_add(1),
        (None, None) => 1,
    }
}

/// Which jump, if any, a re-anchor check should trigger.
pub fn reanchor_decision(cursor: Index, estimate: Index, drift: Index) -> Option<WalkerState> {
    if estimate > cursor.saturating_add(drift) {
        Some(WalkerState::CatchingUp { estimate })
    } else if cursor > estimate.saturating_add(drift) {
        Some(WalkerState::Rewinding { estimate })
    } else {
        None
    }
}

pub struct Walker {
    sequence: Sequence,
    handles: EngineHandles,
    lane: DispatchLane,
    state: WalkerState,
    cursor: Index,
    checkpoint: Index,
    pending: Option<Discovery>,
    miss_streak: u32,
}

impl Walker {
    pub fn new(sequence: Sequence, handles: EngineHandles) -> Self {
        let lane = handles.pool.lane(handles.config.min_send_interval);
        Self {
            sequence,
            handles,
            lane,
            state: WalkerState::Seeding,
            cursor: 0,
            checkpoint: 0,
            pending: None,
            miss_streak: 0,
        }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn id(&self) -> SequenceId {
        self.sequence.id
    }

    pub fn state(&self) -> WalkerState {
        self.state
    }

    /// Next index to probe. Meaningless while seeding.
    pub fn cursor(&self) -> Index {
        self.cursor
    }

    /// Last index this walker saw confirmed.
    pub fn checkpoint(&self) -> Index {
        self.checkpoint
    }

    pub async fn step(&mut self) -> EngineResult<StepOutcome> {
        match self.state {
            WalkerState::Seeding => Ok(self.seed().await),
            WalkerState::Walking => self.walk().await,
            WalkerState::CatchingUp { estimate } => {
                let from = self.cursor;
                self.cursor = estimate.saturating_add(1);
                self.state = WalkerState::Walking;
                tracing::info!(
                    sequence = %self.sequence.id,
                    cursor = self.cursor,
                    "[{}] catching up: {from} -> {}",
                    self.sequence.label,
                    self.cursor
                );
                Ok(StepOutcome::CaughtUp {
                    from,
                    to: self.cursor,
                })
            }
            WalkerState::Rewinding { estimate } => {
                let from = self.cursor;
                self.cursor = estimate.max(self.checkpoint).saturating_add(1);
                self.state = WalkerState::Walking;
                tracing::info!(
                    sequence = %self.sequence.id,
                    cursor = self.cursor,
                    "[{}] rewinding: {from} -> {}",
                    self.sequence.label,
                    self.cursor
                );
                Ok(StepOutcome::Rewound {
                    from,
                    to: self.cursor,
                })
            }
        }
    }

    async fn seed(&mut self) -> StepOutcome {
        let checkpoint = self.handles.ledger.get(self.sequence.id).await;
        let estimate = self.handles.frontier.estimate(&self.sequence).await;

        self.checkpoint = checkpoint.unwrap_or(0);
        self.cursor = seed_cursor(checkpoint, estimate);
        self.miss_streak = 0;
        self.state = WalkerState::Walking;

        tracing::info!(
            sequence = %self.sequence.id,
            cursor = self.cursor,
            "[{}] seeded (checkpoint {:?}, estimate {:?})",
            self.sequence.label,
            checkpoint,
            estimate
        );
        StepOutcome::Seeded {
            cursor: self.cursor,
        }
    }

    async fn walk(&mut self) -> EngineResult<StepOutcome> {
        if let Some(discovery) = self.pending.take() {
            return Ok(self.deliver(discovery).await);
        }

        let index = self.cursor;
        let outcome = self.handles.gate.probe(&self.sequence, index).await?;
        let exhausted = match outcome {
            ProbeOutcome::Hit(record) => {
                self.miss_streak = 0;
                tracing::info!(
                    sequence = %self.sequence.id,
                    index,
                    "[{}] found gift #{index}",
                    self.sequence.label
                );
                let discovery = Discovery::new(&self.sequence, index, record);
                return Ok(self.deliver(discovery).await);
            }
            ProbeOutcome::Absent => false,
            ProbeOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::debug!(
                    sequence = %self.sequence.id,
                    index,
                    "[{}] #{index} unreachable after {attempts} attempt(s): {last_error}",
                    self.sequence.label
                );
                true
            }
        };

        self.cursor = self.cursor.saturating_add(1);
        self.miss_streak = self.miss_streak.saturating_add(1);
        tokio::time::sleep(self.handles.config.miss_pacing).await;

        let every = self.handles.config.reanchor_every.max(1);
        if self.miss_streak % every == 0 {
            self.reanchor().await;
        }

        Ok(StepOutcome::Missed { index, exhausted })
    }

    async fn deliver(&mut self, discovery: Discovery) -> StepOutcome {
        let index = discovery.index;
        if self.lane.dispatch(&discovery).await {
            self.handles.ledger.commit(self.sequence.id, index).await;
            self.checkpoint = self.checkpoint.max(index);
            self.cursor = index.saturating_add(1);
            StepOutcome::Dispatched { index }
        } else {
            self.pending = Some(discovery);
            tokio::time::sleep(self.handles.config.dispatch_retry).await;
            StepOutcome::DispatchFailed { index }
        }
    }

    async fn reanchor(&mut self) {
        let Some(estimate) = self.handles.frontier.estimate(&self.sequence).await else {
            return;
        };
        let drift = self.handles.config.drift_threshold;
        if let Some(next) = reanchor_decision(self.cursor, estimate, drift) {
            tracing::debug!(
                sequence = %self.sequence.id,
                cursor = self.cursor,
                estimate,
                "[{}] re-anchoring after {} misses",
                self.sequence.label,
                self.miss_streak
            );
            self.miss_streak = 0;
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_cursor() {
        assert_eq!(seed_cursor(Some(500), Some(510)), 511);
        assert_eq!(seed_cursor(Some(500), Some(20)), 501);
        assert_eq!(seed_cursor(Some(500), None), 501);
        assert_eq!(seed_cursor(None, Some(42)), 43);
        assert_eq!(seed_cursor(None, Some(0)), 1);
        assert_eq!(seed_cursor(None, None), 1);
    }

    #[test]
    fn test_reanchor_decision() {
        assert_eq!(
            reanchor_decision(100, 5000, 1000),
            Some(WalkerState::CatchingUp { estimate: 5000 })
        );
        assert_eq!(reanchor_decision(100, 1100, 1000), None);
        assert_eq!(reanchor_decision(630, 500, 1000), None);
        assert_eq!(
            reanchor_decision(2600, 1500, 1000),
            Some(WalkerState::Rewinding { estimate: 1500 })
        );
    }

    #[test]
    fn test_seed_cursor_saturates() {
        assert_eq!(seed_cursor(None, Some(Index::MAX)), Index::MAX);
        assert_eq!(seed_cursor(Some(Index::MAX), Some(3)), Index::MAX);
    }

    #[test]
    fn test_reanchor_decision_saturates() {
        assert_eq!(reanchor_decision(Index::MAX, Index::MAX, 1000), None);
    }
}
