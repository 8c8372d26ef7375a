use crate::error::NeuraGraphError;
use crate::operation::{CheckpointStore, RunId};

/// Forward-pass state of one kernel plus its checkpoints.
///
/// `forward` records the live state, `backward` reads it, and
/// `store`/`restore` copy it in and out of the per-run checkpoint map.
#[derive(Debug, Clone)]
pub struct SavedState<S: Clone> {
    current: Option<S>,
    checkpoints: CheckpointStore<S>,
}

impl<S: Clone> SavedState<S> {
    pub fn new() -> Self {
        SavedState {
            current: None,
            checkpoints: CheckpointStore::new(),
        }
    }

    /// Replaces the live state with the one produced by the latest forward call.
    pub fn record(&mut self, state: S) {
        self.current = Some(state);
    }

    /// # Errors
    /// `NeuraGraphError::MissingForwardState` if no forward call (or restore) happened yet.
    pub fn current(&self, operation: &str) -> Result<&S, NeuraGraphError> {
        self.current
            .as_ref()
            .ok_or_else(|| NeuraGraphError::MissingForwardState {
                operation: operation.to_string(),
            })
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn store(&self, run_id: RunId, operation: &str) -> Result<(), NeuraGraphError> {
        let state = self.current(operation)?.clone();
        self.checkpoints.store(run_id, state)
    }

    pub fn restore(&mut self, run_id: RunId, operation: &str) -> Result<(), NeuraGraphError> {
        let state = self.checkpoints.restore(run_id, operation)?;
        self.current = Some(state);
        Ok(())
    }

    pub fn release(&self, run_id: RunId) {
        self.checkpoints.release(run_id);
    }

    pub fn checkpoints(&self) -> &CheckpointStore<S> {
        &self.checkpoints
    }
}

impl<S: Clone> Default for SavedState<S> {
    fn default() -> Self {
        Self::new()
    }
}
