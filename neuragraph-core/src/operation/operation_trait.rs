use crate::error::NeuraGraphError;
use crate::operation::{BackwardResult, GradientRole, RunId};
use crate::tensor::Value;
use std::fmt::Debug;

/// The contract every node of the operation graph satisfies.
///
/// Kernels with very different signatures (unary activations, binary
/// arithmetic, normalization with learnable parameters, convolutions over
/// stacks) are driven through this one interface, so the executor can treat
/// them polymorphically.
///
/// The trait requires `Debug + Send` because operations are boxed into the
/// graph arena and invoked from worker threads during the backward pass. Each
/// operation only ever touches its own fields.
pub trait Operation: Debug + Send {
    /// Short, stable name of the kernel (e.g. `"Sigmoid"`), used in errors and logs.
    fn operation_type(&self) -> &'static str;

    /// Gradient role carried for each input position.
    ///
    /// The length is the operation's arity. During the backward pass the
    /// executor routes `result.get(roles[i])` to whichever node produced input `i`.
    fn input_roles(&self) -> Vec<GradientRole>;

    /// Computes the output from `inputs` and records whatever the backward pass needs.
    ///
    /// # Errors
    /// * `ArityMismatch` if `inputs.len()` differs from `input_roles().len()`.
    /// * `ValueKindMismatch` / `ShapeMismatch` for incompatible inputs.
    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError>;

    /// Computes the gradients for this operation's inputs given the gradient of
    /// its output (`d_output`, same shape as the forward output).
    ///
    /// # Returns
    /// A [`BackwardResult`] populated only with the roles this kernel is
    /// responsible for.
    ///
    /// # Errors
    /// `MissingForwardState` if called before `forward` (or `restore`), plus any
    /// shape error raised by the kernel.
    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError>;

    /// Saves the state recorded by the latest `forward` under `run_id`.
    ///
    /// Stateless kernels keep the default no-op.
    fn store(&mut self, _run_id: RunId) -> Result<(), NeuraGraphError> {
        Ok(())
    }

    /// Reinstates the state saved under `run_id` so `backward` can replay it.
    ///
    /// # Errors
    /// `MissingCheckpoint` when nothing was stored for `run_id`.
    fn restore(&mut self, _run_id: RunId) -> Result<(), NeuraGraphError> {
        Ok(())
    }

    /// Drops the checkpoint for `run_id`, if any.
    fn release(&mut self, _run_id: RunId) {}
}

/// Checks that an operation received exactly `expected` inputs.
pub fn check_arity(
    inputs: &[Value],
    expected: usize,
    operation: &str,
) -> Result<(), NeuraGraphError> {
    if inputs.len() != expected {
        return Err(NeuraGraphError::ArityMismatch {
            expected,
            actual: inputs.len(),
            operation: operation.to_string(),
        });
    }
    Ok(())
}
