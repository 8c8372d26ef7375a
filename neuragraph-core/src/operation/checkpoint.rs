use crate::error::NeuraGraphError;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a forward run whose intermediate state was checkpointed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    /// Allocates a process-unique run id.
    pub fn next() -> Self {
        RunId(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RunId {
    fn from(value: u64) -> Self {
        RunId(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Anything that owns checkpoints which can be dropped by run id.
///
/// Implemented by [`CheckpointStore`] and by the graph, so a
/// [`CheckpointGuard`] can release either.
pub trait ReleaseCheckpoint {
    fn release_checkpoint(&self, run_id: RunId);
}

/// Thread-safe map from run id to saved operation state.
///
/// Inserts take the write side of the lock, so parallel batch slots may store
/// concurrently. Entries live until [`CheckpointStore::release`] (or a
/// [`CheckpointGuard`]) drops them.
pub struct CheckpointStore<S> {
    entries: RwLock<HashMap<RunId, S>>,
}

impl<S: Clone> CheckpointStore<S> {
    pub fn new() -> Self {
        CheckpointStore {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Saves `state` under `run_id`, replacing any previous entry for that run.
    pub fn store(&self, run_id: RunId, state: S) -> Result<(), NeuraGraphError> {
        let mut guard = self.entries.write().map_err(|e| NeuraGraphError::LockError {
            lock_type: "write".to_string(),
            reason: format!("Checkpoint store poisoned during store: {}", e),
        })?;
        if guard.insert(run_id, state).is_some() {
            debug!("CheckpointStore: overwrote existing checkpoint for {}", run_id);
        }
        Ok(())
    }

    /// Returns a copy of the state saved under `run_id`.
    ///
    /// # Errors
    /// `NeuraGraphError::MissingCheckpoint` when nothing was stored for `run_id`.
    pub fn restore(&self, run_id: RunId, operation: &str) -> Result<S, NeuraGraphError> {
        let guard = self.entries.read().map_err(|e| NeuraGraphError::LockError {
            lock_type: "read".to_string(),
            reason: format!("Checkpoint store poisoned during restore: {}", e),
        })?;
        guard
            .get(&run_id)
            .cloned()
            .ok_or_else(|| NeuraGraphError::MissingCheckpoint {
                run_id,
                operation: operation.to_string(),
            })
    }

    /// Stores `state` and returns a guard that releases it when dropped.
    pub fn scoped(
        &self,
        run_id: RunId,
        state: S,
    ) -> Result<CheckpointGuard<'_, Self>, NeuraGraphError> {
        self.store(run_id, state)?;
        Ok(CheckpointGuard::new(self, run_id))
    }

    /// Drops the entry for `run_id`, returning it if present.
    pub fn release(&self, run_id: RunId) -> Option<S> {
        match self.entries.write() {
            Ok(mut guard) => guard.remove(&run_id),
            Err(poisoned) => {
                warn!("CheckpointStore: lock poisoned during release of {}. Recovering.", run_id);
                poisoned.into_inner().remove(&run_id)
            }
        }
    }

    pub fn contains(&self, run_id: RunId) -> bool {
        self.entries
            .read()
            .map(|g| g.contains_key(&run_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run ids currently held, in ascending order.
    pub fn run_ids(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self
            .entries
            .read()
            .map(|g| g.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

impl<S: Clone> Default for CheckpointStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone> Clone for CheckpointStore<S> {
    fn clone(&self) -> Self {
        let entries = self
            .entries
            .read()
            .map(|g| g.clone())
            .unwrap_or_default();
        CheckpointStore {
            entries: RwLock::new(entries),
        }
    }
}

impl<S> fmt::Debug for CheckpointStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.entries.read().map(|g| g.len()).unwrap_or(0);
        f.debug_struct("CheckpointStore")
            .field("entries", &count)
            .finish()
    }
}

impl<S: Clone> ReleaseCheckpoint for CheckpointStore<S> {
    fn release_checkpoint(&self, run_id: RunId) {
        self.release(run_id);
    }
}

/// Releases a run's checkpoints when dropped, unless [`CheckpointGuard::keep`] is called.
#[must_use = "dropping the guard immediately releases the checkpoint"]
pub struct CheckpointGuard<'a, R: ReleaseCheckpoint + ?Sized> {
    owner: &'a R,
    run_id: RunId,
    armed: bool,
}

impl<'a, R: ReleaseCheckpoint + ?Sized> CheckpointGuard<'a, R> {
    pub fn new(owner: &'a R, run_id: RunId) -> Self {
        CheckpointGuard {
            owner,
            run_id,
            armed: true,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Disarms the guard; the checkpoint outlives it and must be released explicitly.
    pub fn keep(mut self) -> RunId {
        self.armed = false;
        self.run_id
    }
}

impl<R: ReleaseCheckpoint + ?Sized> Drop for CheckpointGuard<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            debug!("CheckpointGuard: releasing {}", self.run_id);
            self.owner.release_checkpoint(self.run_id);
        }
    }
}

#[cfg(test)]
#[path = "checkpoint_test.rs"]
mod tests;
