use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::Value;

/// Element-wise product `left * right`.
#[derive(Debug, Clone, Default)]
pub struct HadamardProductOperation {
    operands: SavedState<(Value, Value)>,
}

impl HadamardProductOperation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for HadamardProductOperation {
    fn operation_type(&self) -> &'static str {
        "HadamardProduct"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::LeftInput, GradientRole::RightInput]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 2, self.operation_type())?;
        let output = inputs[0].zip_map(&inputs[1], self.operation_type(), |a, b| a * b)?;
        self.operands.record((inputs[0].clone(), inputs[1].clone()));
        Ok(output)
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let (left, right) = self.operands.current(self.operation_type())?;
        let d_left = d_output.zip_map(right, self.operation_type(), |g, r| g * r)?;
        let d_right = d_output.zip_map(left, self.operation_type(), |g, l| g * l)?;
        Ok(BackwardResult::new()
            .with_left_input_gradient(d_left)
            .with_right_input_gradient(d_right))
    }

    fn store(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.operands.store(run_id, self.operation_type())
    }

    fn restore(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.operands.restore(run_id, self.operation_type())
    }

    fn release(&mut self, run_id: RunId) {
        self.operands.release(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{check_operation_gradients, GradCheckTolerance};
    use crate::tensor::{DeepMatrix, Matrix};

    #[test]
    fn test_hadamard_grad_check_on_stacks() -> Result<(), NeuraGraphError> {
        let left: Value = DeepMatrix::new(vec![
            Matrix::from_vec(1, 2, vec![1.0, -2.0])?,
            Matrix::from_vec(1, 2, vec![0.5, 3.0])?,
        ])?
        .into();
        let right = left.map(|x| x * 0.5 - 1.0);
        let upstream = left.map(|_| 1.0);
        let result = check_operation_gradients(
            HadamardProductOperation::new,
            &[left, right],
            &upstream,
            GradCheckTolerance::default(),
        );
        assert!(result.is_ok(), "Hadamard grad check failed: {:?}", result.err());
        Ok(())
    }
}
