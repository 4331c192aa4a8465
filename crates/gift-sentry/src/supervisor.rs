//! Sequence supervisor: one walker task per sequence, plus the premarket
//! scan, until shutdown.
//!
//! The catalog only grows at runtime. The premarket scan reports a newly
//! live gift as a [`SequenceEvent`] and the supervisor spawns a walker for
//! it, leaving existing walkers untouched.

use crate::checkpoint::CheckpointMap;
use crate::premarket::PremarketScan;
use crate::types::{truncate_message, EngineError, Sequence, SequenceId};
use crate::walker::{EngineHandles, Walker};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

const LOGGED_ERROR_CHARS: usize = 100;
const EVENT_BUFFER: usize = 16;

/// Catalog change reported to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent {
    /// A premarket gift went live and was given this sequence.
    Promoted(Sequence),
}

pub struct Supervisor {
    handles: EngineHandles,
    sequences: Vec<Sequence>,
    premarket: Option<PremarketScan>,
}

impl Supervisor {
    pub fn new(handles: EngineHandles, sequences: Vec<Sequence>) -> Self {
        Self {
            handles,
            sequences,
            premarket: None,
        }
    }

    pub fn with_premarket(mut self, scan: PremarketScan) -> Self {
        self.premarket = Some(scan);
        self
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Run every walker until `shutdown` resolves, then stop them after
    /// their current step, close the fetch gate and flush the checkpoints.
    ///
    /// Returns the final checkpoint mapping.
    pub async fn run<F>(self, shutdown: F) -> CheckpointMap
    where
        F: Future<Output = ()>,
    {
        let Self {
            handles,
            mut sequences,
            premarket,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = mpsc::channel(EVENT_BUFFER);
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);
        let mut stopping = false;

        tracing::info!("starting {} walker(s)", sequences.len());
        for sequence in &sequences {
            tasks.spawn(supervise_walker(
                sequence.clone(),
                handles.clone(),
                stop_rx.clone(),
            ));
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested during startup");
                    stopping = true;
                    break;
                }
                _ = tokio::time::sleep(handles.config.spawn_stagger) => {}
            }
        }

        let mut events_open = match premarket {
            Some(mut scan) if !stopping => {
                scan.reserve_ids(&sequences);
                tasks.spawn(scan.run(event_tx, stop_rx.clone()));
                true
            }
            _ => false,
        };

        while !stopping {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    stopping = true;
                }
                event = event_rx.recv(), if events_open => match event {
                    Some(SequenceEvent::Promoted(sequence)) => {
                        tracing::info!(
                            sequence = %sequence.id,
                            "[{}] added to the watch pool",
                            sequence.label
                        );
                        tasks.spawn(supervise_walker(
                            sequence.clone(),
                            handles.clone(),
                            stop_rx.clone(),
                        ));
                        sequences.push(sequence);
                    }
                    None => events_open = false,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("supervised task ended abnormally: {e}");
                    }
                }
            }
        }

        let _ = stop_tx.send(true);
        handles.gate.close();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("task failed during shutdown: {e}");
            }
        }

        handles.ledger.flush().await;
        handles.ledger.snapshot().await
    }
}

/// One past the largest id in `sequences`.
pub fn next_id(sequences: &[Sequence]) -> SequenceId {
    sequences
        .iter()
        .map(|s| s.id)
        .max()
        .map_or(SequenceId(1), SequenceId::next)
}

/// Keep a walker alive across panics until shutdown. A replacement walker
/// re-seeds from the checkpoint.
async fn supervise_walker(sequence: Sequence, handles: EngineHandles, mut stop: watch::Receiver<bool>) {
    let cooldown = handles.config.iteration_cooldown;
    loop {
        if *stop.borrow() {
            break;
        }
        let walker = Walker::new(sequence.clone(), handles.clone());
        let task = tokio::spawn(drive(walker, cooldown, stop.clone()));
        match task.await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                tracing::error!(
                    sequence = %sequence.id,
                    "[{}] walker panicked, restarting after {:?}",
                    sequence.label,
                    cooldown
                );
                if sleep_or_stop(cooldown, &mut stop).await {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

/// Step `walker` until shutdown, absorbing iteration errors.
async fn drive(mut walker: Walker, cooldown: Duration, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        match walker.step().await {
            Ok(_) => {}
            Err(EngineError::GateClosed) => {
                tracing::debug!(sequence = %walker.id(), "fetch gate closed, walker stopping");
                break;
            }
            Err(e) => {
                tracing::error!(
                    sequence = %walker.id(),
                    cursor = walker.cursor(),
                    "[{}] iteration failed: {}",
                    walker.sequence().label,
                    truncate_message(&e.to_string(), LOGGED_ERROR_CHARS)
                );
                if sleep_or_stop(cooldown, &mut stop).await {
                    break;
                }
            }
        }
    }
    tracing::debug!(
        sequence = %walker.id(),
        cursor = walker.cursor(),
        "walker stopped"
    );
}

/// Sleep for `duration` unless shutdown arrives first. Returns `true` on
/// shutdown, including one that was already seen by an earlier wait.
pub(crate) async fn sleep_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *stop.borrow(),
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}
