use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::Value;

/// Logistic sigmoid `1 / (1 + e^-x)`, applied element-wise.
#[derive(Debug, Clone, Default)]
pub struct SigmoidOperation {
    output: SavedState<Value>,
}

impl SigmoidOperation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for SigmoidOperation {
    fn operation_type(&self) -> &'static str {
        "Sigmoid"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 1, self.operation_type())?;
        let output = inputs[0].map(|x| 1.0 / (1.0 + (-x).exp()));
        self.output.record(output.clone());
        Ok(output)
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let y = self.output.current(self.operation_type())?;
        let d_input = d_output.zip_map(y, self.operation_type(), |g, y| g * y * (1.0 - y))?;
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
