// neuragraph-core/src/autograd/grad_check.rs

use crate::error::NeuraGraphError;
use crate::operation::Operation;
use crate::tensor::Value;
use approx::relative_eq;
use log::trace;
use thiserror::Error;

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient check failed for input {input_index}, element {element_index}: analytical {analytical_grad:?} != numerical {numerical_grad:?} (difference {difference:?})")]
    GradientMismatch {
        input_index: usize,
        element_index: usize,
        analytical_grad: f64,
        numerical_grad: f64,
        difference: f64,
    },

    #[error("Input {input_index} has no analytical gradient in the backward result")]
    MissingAnalyticalGrad { input_index: usize },

    #[error("Analytical gradient for input {input_index} has shape {actual:?}, expected {expected:?}")]
    GradientShapeMismatch {
        input_index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Numerical gradient is NaN or infinite for input {input_index}, element {element_index}. Loss+: {loss_plus:?}, Loss-: {loss_minus:?}")]
    NumericalGradNaNOrInfinite {
        input_index: usize,
        element_index: usize,
        loss_plus: f64,
        loss_minus: f64,
    },

    #[error("Forward function execution failed during gradient check: {0}")]
    ForwardPassError(NeuraGraphError),

    #[error("Backward pass execution failed during gradient check: {0}")]
    BackwardPassError(NeuraGraphError),

    #[error("Tensor error during intermediate calculation: {0}")]
    TensorError(NeuraGraphError),
}

impl From<NeuraGraphError> for GradCheckError {
    fn from(err: NeuraGraphError) -> Self {
        GradCheckError::TensorError(err)
    }
}

/// Tolerances used by [`check_operation_gradients`].
#[derive(Debug, Clone, Copy)]
pub struct GradCheckTolerance {
    /// Finite difference step.
    pub epsilon: f64,
    /// Absolute tolerance.
    pub abs_tolerance: f64,
    /// Relative tolerance.
    pub rel_tolerance: f64,
}

impl Default for GradCheckTolerance {
    fn default() -> Self {
        GradCheckTolerance {
            epsilon: 1e-6,
            abs_tolerance: 1e-4,
            rel_tolerance: 1e-4,
        }
    }
}

/// Checks an operation's analytical gradients against central finite differences.
///
/// The scalar loss is `sum(forward(inputs) * output_grad)`, so the numerical
/// derivative for element `k` of input `i` is
/// `(L(x + eps) - L(x - eps)) / (2 * eps)` and must match the gradient the
/// operation returns under `input_roles()[i]`.
///
/// `factory` must produce identically configured instances: the
/// perturbed forward passes run on fresh operations so no state leaks between
/// evaluations (stochastic kernels need a fixed seed).
///
/// # Errors
/// Returns the first [`GradCheckError`] encountered.
pub fn check_operation_gradients<O, F>(
    factory: F,
    inputs: &[Value],
    output_grad: &Value,
    tolerance: GradCheckTolerance,
) -> Result<(), GradCheckError>
where
    O: Operation,
    F: Fn() -> O,
{
    // --- 1. Analytical gradients ---
    let mut op = factory();
    let output = op.forward(inputs).map_err(GradCheckError::ForwardPassError)?;
    if output.shape() != output_grad.shape() {
        return Err(GradCheckError::TensorError(NeuraGraphError::ShapeMismatch {
            expected: output.shape(),
            actual: output_grad.shape(),
            operation: "check_operation_gradients".to_string(),
        }));
    }
    let result = op.backward(output_grad).map_err(GradCheckError::BackwardPassError)?;
    let roles = op.input_roles();

    // --- 2. Numerical gradients, element by element ---
    for (input_index, role) in roles.iter().enumerate() {
        let analytical = result
            .get(*role)
            .ok_or(GradCheckError::MissingAnalyticalGrad { input_index })?;
        let original = &inputs[input_index];
        if analytical.shape() != original.shape() {
            return Err(GradCheckError::GradientShapeMismatch {
                input_index,
                expected: original.shape(),
                actual: analytical.shape(),
            });
        }
        let analytical_data = analytical.flatten();
        let original_data = original.flatten();

        for element_index in 0..original_data.len() {
            let loss_plus = perturbed_loss(
                &factory,
                inputs,
                input_index,
                &original_data,
                element_index,
                tolerance.epsilon,
                output_grad,
            )?;
            let loss_minus = perturbed_loss(
                &factory,
                inputs,
                input_index,
                &original_data,
                element_index,
                -tolerance.epsilon,
                output_grad,
            )?;
            let numerical_grad = (loss_plus - loss_minus) / (2.0 * tolerance.epsilon);

            if !numerical_grad.is_finite() {
                return Err(GradCheckError::NumericalGradNaNOrInfinite {
                    input_index,
                    element_index,
                    loss_plus,
                    loss_minus,
                });
            }

            let analytical_grad = analytical_data[element_index];
            trace!(
                "grad_check: input {} element {} analytical {} numerical {}",
                input_index,
                element_index,
                analytical_grad,
                numerical_grad
            );
            if !relative_eq!(
                analytical_grad,
                numerical_grad,
                epsilon = tolerance.abs_tolerance,
                max_relative = tolerance.rel_tolerance
            ) {
                return Err(GradCheckError::GradientMismatch {
                    input_index,
                    element_index,
                    analytical_grad,
                    numerical_grad,
                    difference: (analytical_grad - numerical_grad).abs(),
                });
            }
        }
    }
    Ok(())
}

/// Runs a fresh forward pass with one element shifted by `delta` and returns the weighted loss.
fn perturbed_loss<O, F>(
    factory: &F,
    inputs: &[Value],
    input_index: usize,
    original_data: &[f64],
    element_index: usize,
    delta: f64,
    output_grad: &Value,
) -> Result<f64, GradCheckError>
where
    O: Operation,
    F: Fn() -> O,
{
    let mut data = original_data.to_vec();
    data[element_index] += delta;
    let mut perturbed_inputs = inputs.to_vec();
    perturbed_inputs[input_index] = inputs[input_index].from_flat_like(&data)?;

    let mut op = factory();
    let output = op
        .forward(&perturbed_inputs)
        .map_err(GradCheckError::ForwardPassError)?;
    weighted_sum(&output, output_grad)
}

fn weighted_sum(output: &Value, weights: &Value) -> Result<f64, GradCheckError> {
    let product = output.zip_map(weights, "grad_check::weighted_sum", |a, b| a * b)?;
    Ok(product.sum())
}
