use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::Value;

/// Leaky ReLU: `x` for positive inputs, `alpha * x` otherwise.
///
/// The input is kept because the derivative depends on its sign.
#[derive(Debug, Clone)]
pub struct LeakyReluOperation {
    alpha: f64,
    input: SavedState<Value>,
}

impl LeakyReluOperation {
    pub fn new(alpha: f64) -> Self {
        LeakyReluOperation {
            alpha,
            input: SavedState::new(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Default for LeakyReluOperation {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Operation for LeakyReluOperation {
    fn operation_type(&self) -> &'static str {
        "LeakyRelu"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 1, self.operation_type())?;
        let alpha = self.alpha;
        let output = inputs[0].map(|x| if x > 0.0 { x } else { alpha * x });
        self.input.record(inputs[0].clone());
        Ok(output)
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let alpha = self.alpha;
        let x = self.input.current(self.operation_type())?;
        let d_input = d_output.zip_map(x, self.operation_type(), |g, x| {
            if x > 0.0 {
                g
            } else {
                alpha * g
            }
        })?;
        Ok(BackwardResult::new().with_input_gradient(d_input))
    }

    fn store(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.input.store(run_id, self.operation_type())
    }

    fn restore(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.input.restore(run_id, self.operation_type())
    }

    fn release(&mut self, run_id: RunId) {
        self.input.release(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{check_operation_gradients, GradCheckTolerance};
    use crate::tensor::Matrix;

    #[test]
    fn test_leaky_relu_forward_backward() -> Result<(), NeuraGraphError> {
        let mut op = LeakyReluOperation::new(0.1);
        let out = op.forward(&[Matrix::from_vec(1, 3, vec![-2.0, 0.0, 3.0])?.into()])?;
        assert_eq!(out.flatten(), vec![-0.2, 0.0, 3.0]);
        let grads = op.backward(&Matrix::filled(1, 3, 1.0).into())?;
        assert_eq!(
            grads.get(GradientRole::Input).map(Value::flatten),
            Some(vec![0.1, 0.1, 1.0])
        );
        Ok(())
    }

    #[test]
    fn test_leaky_relu_grad_check_away_from_kink() -> Result<(), NeuraGraphError> {
        let input: Value = Matrix::from_vec(2, 2, vec![-1.0, -0.3, 0.2, 1.7])?.into();
        let upstream = input.map(|_| 1.0);
        let result = check_operation_gradients(
            || LeakyReluOperation::new(0.2),
            &[input],
            &upstream,
            GradCheckTolerance::default(),
        );
        assert!(result.is_ok(), "LeakyRelu grad check failed: {:?}", result.err());
        Ok(())
    }
}
