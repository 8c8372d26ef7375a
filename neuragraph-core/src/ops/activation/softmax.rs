use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::{Matrix, Value};

/// Row-wise softmax over a [`Matrix`].
///
/// Each row is shifted by its maximum before exponentiation. Backward applies
/// the softmax Jacobian row by row: `dx_i = y_i * (g_i - sum_j g_j * y_j)`.
#[derive(Debug, Clone, Default)]
pub struct SoftmaxOperation {
    output: SavedState<Matrix>,
}

impl SoftmaxOperation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for SoftmaxOperation {
    fn operation_type(&self) -> &'static str {
        "Softmax"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 1, self.operation_type())?;
        let x = inputs[0].as_matrix(self.operation_type())?;
        let mut y = Matrix::zeros_like(x);
        for r in 0..x.rows() {
            let row = x.row(r);
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let out = y.row_mut(r);
            let mut total = 0.0;
            for (o, &v) in out.iter_mut().zip(row.iter()) {
                *o = (v - max).exp();
                total += *o;
            }
            out.iter_mut().for_each(|o| *o /= total);
        }
        self.output.record(y.clone());
        Ok(Value::Matrix(y))
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let y = self.output.current(self.operation_type())?;
        let g = d_output.as_matrix(self.operation_type())?;
        y.ensure_same_shape(g, self.operation_type())?;
        let mut d_input = Matrix::zeros_like(y);
        for r in 0..y.rows() {
            let y_row = y.row(r);
            let g_row = g.row(r);
            let dot: f64 = y_row.iter().zip(g_row.iter()).map(|(a, b)| a * b).sum();
            for ((d, &yi), &gi) in d_input.row_mut(r).iter_mut().zip(y_row).zip(g_row) {
                *d = yi * (gi - dot);
            }
        }
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
mod tests {
    use super::*;
    use crate::autograd::{check_operation_gradients, GradCheckTolerance};
    use approx::assert_relative_eq;

    #[test]
    fn test_softmax_rows_sum_to_one() -> Result<(), NeuraGraphError> {
        let mut op = SoftmaxOperation::new();
        let x = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![1000.0, 1000.0, 1000.0]])?;
        let y = op.forward(&[x.into()])?;
        let y = y.as_matrix("test")?;
        for r in 0..2 {
            assert_relative_eq!(y.row(r).iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(y[(1, 0)], 1.0 / 3.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_softmax_grad_check() -> Result<(), NeuraGraphError> {
        let input: Value = Matrix::from_rows(vec![
            vec![0.1, -0.4, 1.3],
            vec![2.0, 0.0, -1.0],
        ])?
        .into();
        let upstream: Value = Matrix::from_rows(vec![
            vec![1.0, 0.0, -1.0],
            vec![0.5, 2.0, 0.25],
        ])?
        .into();
        let result = check_operation_gradients(
            SoftmaxOperation::new,
            &[input],
            &upstream,
            GradCheckTolerance::default(),
        );
        assert!(result.is_ok(), "Softmax grad check failed: {:?}", result.err());
        Ok(())
    }

    #[test]
    fn test_softmax_rejects_stacks() {
        let mut op = SoftmaxOperation::new();
        let stack = Value::from(crate::tensor::DeepMatrix::zeros(2, 1, 1));
        assert!(matches!(
            op.forward(&[stack]),
            Err(NeuraGraphError::ValueKindMismatch { .. })
        ));
    }
}
