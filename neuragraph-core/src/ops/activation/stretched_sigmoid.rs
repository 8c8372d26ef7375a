use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::Value;
use std::f64::consts::PI;

/// Base of the stretched sigmoid, `pi - 2`.
pub const STRETCH_BASE: f64 = PI - 2.0;

/// Element-wise stretched sigmoid `f(x) = 1 / (1 + (pi - 2)^(-x))`.
///
/// The derivative is `f'(x) = ln(pi - 2) * f(x) * (1 - f(x))`, so only the
/// forward output has to be kept for the backward pass.
#[derive(Debug, Clone, Default)]
pub struct StretchedSigmoidOperation {
    output: SavedState<Value>,
}

impl StretchedSigmoidOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(x: f64) -> f64 {
        1.0 / (1.0 + STRETCH_BASE.powf(-x))
    }

    /// Derivative expressed through the activation value `y = f(x)`.
    pub fn derivative_from_output(y: f64) -> f64 {
        STRETCH_BASE.ln() * y * (1.0 - y)
    }
}

impl Operation for StretchedSigmoidOperation {
    fn operation_type(&self) -> &'static str {
        "StretchedSigmoid"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 1, self.operation_type())?;
        let output = inputs[0].map(Self::activate);
        self.output.record(output.clone());
        Ok(output)
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let y = self.output.current(self.operation_type())?;
        let d_input = d_output.zip_map(y, self.operation_type(), |g, y| {
            g * Self::derivative_from_output(y)
        })?;
        Ok(BackwardResult::new().with_input_gradient(d_input))
    }

    fn store(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.output.store(run_id, self.operation_type())
    }

    fn restore(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.output.restore(run_id, self.operation_type())
    }

    fn release(&mut self, run_id: RunId) {
        self.output.release(run_id);
    }
}

#[cfg(test)]
#[path = "stretched_sigmoid_test.rs"]
mod tests;
