use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::{Matrix, Value};

/// Matrix product `C = A * B` with `A: m x k`, `B: k x n`.
///
/// Gradients: `dA = dC * B^T`, `dB = A^T * dC`.
#[derive(Debug, Clone, Default)]
pub struct MatrixMultiplyOperation {
    operands: SavedState<(Matrix, Matrix)>,
}

impl MatrixMultiplyOperation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for MatrixMultiplyOperation {
    fn operation_type(&self) -> &'static str {
        "MatrixMultiply"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::LeftInput, GradientRole::RightInput]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 2, self.operation_type())?;
        let a = inputs[0].as_matrix(self.operation_type())?;
        let b = inputs[1].as_matrix(self.operation_type())?;
        let c = a.matmul(b)?;
        self.operands.record((a.clone(), b.clone()));
        Ok(Value::Matrix(c))
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let (a, b) = self.operands.current(self.operation_type())?;
        let g = d_output.as_matrix(self.operation_type())?;
        if g.rows() != a.rows() || g.cols() != b.cols() {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: vec![a.rows(), b.cols()],
                actual: g.shape(),
                operation: self.operation_type().to_string(),
            });
        }
        let d_a = g.matmul(&b.transpose())?;
        let d_b = a.transpose().matmul(g)?;
        Ok(BackwardResult::new()
            .with_left_input_gradient(d_a)
            .with_right_input_gradient(d_b))
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

    #[test]
    fn test_matrix_multiply_grad_check() -> Result<(), NeuraGraphError> {
        let a: Value = Matrix::from_rows(vec![vec![1.0, 2.0, -1.0], vec![0.5, 0.0, 3.0]])?.into();
        let b: Value = Matrix::from_rows(vec![
            vec![0.2, -1.0],
            vec![1.5, 0.3],
            vec![-0.7, 2.0],
        ])?
        .into();
        let upstream: Value = Matrix::from_rows(vec![vec![1.0, -0.5], vec![2.0, 0.25]])?.into();
        let result = check_operation_gradients(
            MatrixMultiplyOperation::new,
            &[a, b],
            &upstream,
            GradCheckTolerance::default(),
        );
        assert!(result.is_ok(), "MatrixMultiply grad check failed: {:?}", result.err());
        Ok(())
    }

    #[test]
    fn test_matrix_multiply_rejects_wrong_upstream() -> Result<(), NeuraGraphError> {
        let mut op = MatrixMultiplyOperation::new();
        op.forward(&[Matrix::zeros(2, 3).into(), Matrix::zeros(3, 4).into()])?;
        assert!(matches!(
            op.backward(&Matrix::zeros(2, 3).into()),
            Err(NeuraGraphError::ShapeMismatch { .. })
        ));
        Ok(())
    }
}
