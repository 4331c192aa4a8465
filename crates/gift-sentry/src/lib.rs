//! GiftSentry: enumeration engine that walks numbered gift pages, dispatches
//! what it finds and remembers how far each sequence got.

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod frontier;
pub mod gate;
pub mod premarket;
pub mod supervisor;
pub mod types;
pub mod walker;

pub use cache::TtlCache;
pub use checkpoint::{CheckpointLedger, CheckpointMap, CheckpointStore};
pub use config::{EngineConfig, Profile};
pub use dispatch::{DispatchLane, Sender, SenderPool};
pub use frontier::{FrontierEstimator, SearchReport};
pub use gate::{FetchGate, PageSource, ProbeOutcome};
pub use premarket::{slug, PremarketLedger, PremarketScan};
pub use supervisor::{SequenceEvent, Supervisor};
pub use types::*;
pub use walker::{EngineHandles, StepOutcome, Walker, WalkerState};
