//! Durable per-sequence checkpoints.
//!
//! The file is a JSON object mapping the string form of a sequence id to the
//! highest index that was both fetched and dispatched. It is always rewritten
//! wholesale through a temp file and a rename, so a crash mid-write leaves the
//! previous version in place.

use crate::types::{EngineResult, Index, SequenceId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Full checkpoint mapping.
pub type CheckpointMap = BTreeMap<SequenceId, Index>;

/// File-backed checkpoint storage.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the mapping. Missing or corrupt storage yields an empty mapping.
    pub fn load(&self) -> CheckpointMap {
        if !self.path.exists() {
            tracing::info!(
                "no checkpoint file at {}, starting without history",
                self.path.display()
            );
            return CheckpointMap::new();
        }
        match self.read() {
            Ok(map) => {
                tracing::info!(
                    "loaded {} checkpoint(s) from {}",
                    map.len(),
                    self.path.display()
                );
                map
            }
            Err(e) => {
                tracing::warn!(
                    "checkpoint file {} unreadable, starting without history: {e}",
                    self.path.display()
                );
                CheckpointMap::new()
            }
        }
    }

    fn read(&self) -> EngineResult<CheckpointMap> {
        let raw = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Persist the full mapping atomically.
    pub fn save(&self, map: &CheckpointMap) -> EngineResult<()> {
        write_json_atomic(&self.path, map)?;
        tracing::debug!(
            "saved {} checkpoint(s) to {}",
            map.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Write `value` as pretty JSON to `path` via `<path>.tmp` and a rename.
pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Shared, monotonic view over a [`CheckpointStore`].
///
/// Every commit reads the full mapping, raises one key and persists the full
/// mapping back while holding the lock, so concurrent walkers never overwrite
/// each other's progress.
#[derive(Clone)]
pub struct CheckpointLedger {
    store: Arc<CheckpointStore>,
    state: Arc<Mutex<CheckpointMap>>,
}

impl CheckpointLedger {
    /// Load the store and wrap it.
    pub fn open(store: CheckpointStore) -> Self {
        let map = store.load();
        Self {
            store: Arc::new(store),
            state: Arc::new(Mutex::new(map)),
        }
    }

    /// Last confirmed index for `id`.
    pub async fn get(&self, id: SequenceId) -> Option<Index> {
        self.state.lock().await.get(&id).copied()
    }

    /// Copy of the full mapping.
    pub async fn snapshot(&self) -> CheckpointMap {
        self.state.lock().await.clone()
    }

    /// Record that `index` was dispatched for `id` and persist.
    ///
    /// A checkpoint never moves backwards. Returns `false` if the write
    /// failed; the in-memory value is still raised so the next successful
    /// write carries it.
    pub async fn commit(&self, id: SequenceId, index: Index) -> bool {
        let mut map = self.state.lock().await;
        let entry = map.entry(id).or_insert(0);
        if index > *entry {
            *entry = index;
        }
        match self.store.save(&map) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(sequence = %id, index, "checkpoint save failed: {e}");
                false
            }
        }
    }

    /// Persist the current mapping unconditionally.
    pub async fn flush(&self) -> bool {
        let map = self.state.lock().await;
        match self.store.save(&map) {
            Ok(()) => {
                tracing::info!("checkpoints flushed ({} sequence(s))", map.len());
                true
            }
            Err(e) => {
                tracing::warn!("final checkpoint flush failed: {e}");
                false
            }
        }
    }
}
