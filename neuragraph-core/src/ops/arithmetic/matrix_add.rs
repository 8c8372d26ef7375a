use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation};
use crate::tensor::Value;

/// Element-wise sum of two values of the same kind and shape.
///
/// Both gradients equal the upstream gradient, so the kernel keeps no state and
/// relies on the default (no-op) checkpoint methods.
#[derive(Debug, Clone, Default)]
pub struct MatrixAddOperation;

impl MatrixAddOperation {
    pub fn new() -> Self {
        MatrixAddOperation
    }
}

impl Operation for MatrixAddOperation {
    fn operation_type(&self) -> &'static str {
        "MatrixAdd"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::LeftInput, GradientRole::RightInput]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 2, self.operation_type())?;
        inputs[0].zip_map(&inputs[1], self.operation_type(), |a, b| a + b)
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        Ok(BackwardResult::new()
            .with_left_input_gradient(d_output.clone())
            .with_right_input_gradient(d_output.clone()))
    }
}
