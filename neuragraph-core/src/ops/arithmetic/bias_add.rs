use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::{Matrix, Value};

/// Adds a `1 x cols` bias row to every row of a `rows x cols` input.
///
/// The bias gradient is the column-wise sum of the upstream gradient.
#[derive(Debug, Clone, Default)]
pub struct BiasAddOperation {
    /// `(rows, cols)` of the forward input.
    input_shape: SavedState<(usize, usize)>,
}

impl BiasAddOperation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for BiasAddOperation {
    fn operation_type(&self) -> &'static str {
        "BiasAdd"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input, GradientRole::Bias]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 2, self.operation_type())?;
        let x = inputs[0].as_matrix(self.operation_type())?;
        let bias = inputs[1].as_matrix(self.operation_type())?;
        if bias.rows() != 1 || bias.cols() != x.cols() {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: vec![1, x.cols()],
                actual: bias.shape(),
                operation: self.operation_type().to_string(),
            });
        }
        let mut out = x.clone();
        for r in 0..out.rows() {
            for (o, &b) in out.row_mut(r).iter_mut().zip(bias.row(0)) {
                *o += b;
            }
        }
        self.input_shape.record((x.rows(), x.cols()));
        Ok(Value::Matrix(out))
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let (rows, cols) = *self.input_shape.current(self.operation_type())?;
        let g = d_output.as_matrix(self.operation_type())?;
        if g.rows() != rows || g.cols() != cols {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: vec![rows, cols],
                actual: g.shape(),
                operation: self.operation_type().to_string(),
            });
        }
        let mut d_bias = Matrix::zeros(1, g.cols());
        for row in g.iter_rows() {
            for (d, &v) in d_bias.row_mut(0).iter_mut().zip(row) {
                *d += v;
            }
        }
        Ok(BackwardResult::new()
            .with_input_gradient(g.clone())
            .with_bias_gradient(d_bias))
    }

    fn store(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.input_shape.store(run_id, self.operation_type())
    }

    fn restore(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.input_shape.restore(run_id, self.operation_type())
    }

    fn release(&mut self, run_id: RunId) {
        self.input_shape.release(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{check_operation_gradients, GradCheckTolerance};

    #[test]
    fn test_bias_gradient_is_column_sum() -> Result<(), NeuraGraphError> {
        let mut op = BiasAddOperation::new();
        let x: Value = Matrix::zeros(3, 2).into();
        let b: Value = Matrix::from_vec(1, 2, vec![1.0, -1.0])?.into();
        let out = op.forward(&[x, b])?;
        assert_eq!(out.flatten(), vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);

        let g: Value = Matrix::from_rows(vec![
            vec![1.0, 2.0],
            vec![3.0, 4.0],
            vec![5.0, 6.0],
        ])?
        .into();
        let result = op.backward(&g)?;
        assert_eq!(result.get(GradientRole::Bias).map(Value::flatten), Some(vec![9.0, 12.0]));
        assert_eq!(result.get(GradientRole::Input), Some(&g));
        Ok(())
    }

    #[test]
    fn test_backward_rejects_wrong_upstream_width() -> Result<(), NeuraGraphError> {
        let mut op = BiasAddOperation::new();
        let x: Value = Matrix::zeros(2, 3).into();
        let b: Value = Matrix::zeros(1, 3).into();
        op.forward(&[x, b])?;

        let narrow: Value = Matrix::zeros(2, 2).into();
        match op.backward(&narrow) {
            Err(NeuraGraphError::ShapeMismatch { expected, actual, operation }) => {
                assert_eq!(expected, vec![2, 3]);
                assert_eq!(actual, vec![2, 2]);
                assert_eq!(operation, "BiasAdd");
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_bias_add_grad_check() -> Result<(), NeuraGraphError> {
        let x: Value = Matrix::from_rows(vec![vec![0.1, 0.2, 0.3], vec![-1.0, 0.0, 1.0]])?.into();
        let b: Value = Matrix::from_vec(1, 3, vec![0.5, -0.5, 2.0])?.into();
        let upstream: Value = Matrix::from_rows(vec![
            vec![1.0, 2.0, 3.0],
            vec![-1.0, 0.5, 0.0],
        ])?
        .into();
        let result = check_operation_gradients(
            BiasAddOperation::new,
            &[x, b],
            &upstream,
            GradCheckTolerance::default(),
        );
        assert!(result.is_ok(), "BiasAdd grad check failed: {:?}", result.err());
        Ok(())
    }
}
