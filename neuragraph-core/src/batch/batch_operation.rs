use crate::error::NeuraGraphError;
use crate::operation::{BackwardResult, CheckpointStore, GradientRole, Operation, RunId};
use crate::tensor::{DeepMatrix, Value};
use log::debug;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

type SlotFactory<O> = Arc<dyn Fn(usize) -> O + Send + Sync>;

/// Replicates a per-sample operation across the outermost (batch) dimension.
///
/// Slot `i` holds its own operation instance, built by `factory(i)` the first
/// time the slot is used, so stochastic kernels can be seeded per slot.
/// `forward_batch` and `backward_batch` run the slots in parallel on the
/// current rayon pool. Gradients are returned per slot; nothing is reduced
/// across the batch.
pub struct BatchOperation<O: Operation + Clone> {
    factory: SlotFactory<O>,
    operations: Vec<Option<O>>,
    checkpoints: CheckpointStore<Vec<Option<O>>>,
}

impl<O: Operation + Clone> BatchOperation<O> {
    pub fn new<F>(batch_size: usize, factory: F) -> Self
    where
        F: Fn(usize) -> O + Send + Sync + 'static,
    {
        BatchOperation {
            factory: Arc::new(factory),
            operations: (0..batch_size).map(|_| None).collect(),
            checkpoints: CheckpointStore::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.operations.len()
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.extend_operations(batch_size);
    }

    /// Resizes the slot array: growing appends unconstructed slots, shrinking keeps
    /// exactly the first `batch_size` instances.
    pub fn extend_operations(&mut self, batch_size: usize) {
        let previous = self.operations.len();
        if batch_size > previous {
            self.operations.resize_with(batch_size, || None);
        } else {
            self.operations.truncate(batch_size);
        }
        debug!("BatchOperation: resized from {} to {} slots", previous, batch_size);
    }

    /// The instance in slot `index`, if it has been constructed.
    pub fn operation(&self, index: usize) -> Option<&O> {
        self.operations.get(index).and_then(Option::as_ref)
    }

    pub fn constructed_slots(&self) -> usize {
        self.operations.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn checkpoints(&self) -> &CheckpointStore<Vec<Option<O>>> {
        &self.checkpoints
    }

    fn ensure_constructed(&mut self) {
        let factory = &self.factory;
        for (index, slot) in self.operations.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(factory(index));
            }
        }
    }

    fn check_batch_len(&self, value: &Value) -> Result<(), NeuraGraphError> {
        let actual = value.batch_len().ok_or_else(|| NeuraGraphError::ValueKindMismatch {
            expected: "DeepMatrix or FourDimensionalMatrix",
            actual: value.kind(),
            operation: "BatchOperation".to_string(),
        })?;
        if actual != self.batch_size() {
            return Err(NeuraGraphError::BatchSizeMismatch {
                configured: self.batch_size(),
                actual,
            });
        }
        Ok(())
    }

    /// Runs every slot's `forward` on its entry of each batched input and stacks the outputs.
    ///
    /// A batch size of zero yields an empty `DeepMatrix`.
    ///
    /// # Errors
    /// * `BatchSizeMismatch` if an input's outer dimension differs from the batch size.
    /// * `ValueKindMismatch` for an unbatched (`Matrix`) input.
    /// * The first error raised by a slot.
    pub fn forward_batch(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        for input in inputs {
            self.check_batch_len(input)?;
        }
        if self.batch_size() == 0 {
            return Ok(Value::Deep(DeepMatrix::empty(0, 0)));
        }

        let unstacked = inputs
            .iter()
            .map(|v| v.unstack("BatchOperation"))
            .collect::<Result<Vec<_>, _>>()?;
        let per_slot: Vec<Vec<Value>> = (0..self.batch_size())
            .map(|i| unstacked.iter().map(|entries| entries[i].clone()).collect())
            .collect();

        self.ensure_constructed();
        let outputs = self
            .operations
            .par_iter_mut()
            .zip(per_slot.par_iter())
            .map(|(slot, slot_inputs)| match slot {
                Some(op) => op.forward(slot_inputs),
                None => Err(NeuraGraphError::InternalError(
                    "batch slot not constructed before forward".to_string(),
                )),
            })
            .collect::<Result<Vec<Value>, NeuraGraphError>>()?;
        Value::stack(outputs, "BatchOperation")
    }

    /// Runs every slot's `backward` on its entry of `d_output`; one result per slot.
    pub fn backward_batch(
        &mut self,
        d_output: &Value,
    ) -> Result<Vec<BackwardResult>, NeuraGraphError> {
        self.check_batch_len(d_output)?;
        if self.batch_size() == 0 {
            return Ok(Vec::new());
        }
        let gradients = d_output.unstack("BatchOperation")?;
        self.operations
            .par_iter_mut()
            .zip(gradients.par_iter())
            .map(|(slot, gradient)| match slot {
                Some(op) => op.backward(gradient),
                None => Err(NeuraGraphError::MissingForwardState {
                    operation: "BatchOperation".to_string(),
                }),
            })
            .collect()
    }
}

impl<O: Operation + Clone> Operation for BatchOperation<O> {
    fn operation_type(&self) -> &'static str {
        "BatchOperation"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        match self.operations.iter().flatten().next() {
            Some(op) => op.input_roles(),
            None => (self.factory)(0).input_roles(),
        }
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        self.forward_batch(inputs)
    }

    /// Stacks the per-slot gradients of each role; a role is populated only if every slot
    /// returned it.
    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let results = self.backward_batch(d_output)?;
        let mut combined = BackwardResult::new();
        if results.is_empty() {
            return Ok(combined);
        }
        for role in self.input_roles() {
            let per_slot: Option<Vec<Value>> =
                results.iter().map(|r| r.get(role).cloned()).collect();
            if let Some(gradients) = per_slot {
                combined = combined.with(role, Value::stack(gradients, self.operation_type())?);
            }
        }
        Ok(combined)
    }

    /// Checkpoints the whole slot array, including its size.
    fn store(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.checkpoints.store(run_id, self.operations.clone())?;
        debug!("BatchOperation: stored {} slots under {}", self.operations.len(), run_id);
        Ok(())
    }

    /// Reinstates the slot array saved under `run_id`, undoing any resize since.
    fn restore(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.operations = self.checkpoints.restore(run_id, self.operation_type())?;
        debug!("BatchOperation: restored {} slots from {}", self.operations.len(), run_id);
        Ok(())
    }

    fn release(&mut self, run_id: RunId) {
        self.checkpoints.release(run_id);
    }
}

impl<O: Operation + Clone> fmt::Debug for BatchOperation<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOperation")
            .field("batch_size", &self.operations.len())
            .field("constructed", &self.constructed_slots())
            .field("checkpoints", &self.checkpoints)
            .finish()
    }
}

#[cfg(test)]
#[path = "batch_operation_test.rs"]
mod tests;
