use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::{Matrix, Value};

pub const DEFAULT_LAYER_NORM_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone)]
struct LayerNormState {
    normalized: Matrix,
    inv_std: Vec<f64>,
    gamma: Matrix,
}

/// Row-wise layer normalization with learnable scale (`gamma`) and shift (`beta`).
///
/// Inputs: `x` (`rows x cols`), `gamma` and `beta` (both `1 x cols`). Each row
/// of `x` is normalized over its columns, then `y = x_hat * gamma + beta`.
#[derive(Debug, Clone)]
pub struct LayerNormOperation {
    epsilon: f64,
    state: SavedState<LayerNormState>,
}

impl LayerNormOperation {
    pub fn new() -> Self {
        Self::with_epsilon(DEFAULT_LAYER_NORM_EPSILON)
    }

    pub fn with_epsilon(epsilon: f64) -> Self {
        LayerNormOperation {
            epsilon,
            state: SavedState::new(),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn check_parameter(&self, param: &Matrix, cols: usize) -> Result<(), NeuraGraphError> {
        if param.rows() != 1 || param.cols() != cols {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: vec![1, cols],
                actual: param.shape(),
                operation: self.operation_type().to_string(),
            });
        }
        Ok(())
    }
}

impl Default for LayerNormOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for LayerNormOperation {
    fn operation_type(&self) -> &'static str {
        "LayerNorm"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input, GradientRole::Gamma, GradientRole::Beta]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 3, self.operation_type())?;
        let x = inputs[0].as_matrix(self.operation_type())?;
        let gamma = inputs[1].as_matrix(self.operation_type())?;
        let beta = inputs[2].as_matrix(self.operation_type())?;
        self.check_parameter(gamma, x.cols())?;
        self.check_parameter(beta, x.cols())?;

        let n = x.cols() as f64;
        let mut normalized = Matrix::zeros(x.rows(), x.cols());
        let mut output = Matrix::zeros(x.rows(), x.cols());
        let mut inv_std = Vec::with_capacity(x.rows());
        for r in 0..x.rows() {
            let row = x.row(r);
            let mean = row.iter().sum::<f64>() / n;
            let variance = row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let inv = 1.0 / (variance + self.epsilon).sqrt();
            inv_std.push(inv);
            for c in 0..x.cols() {
                let x_hat = (row[c] - mean) * inv;
                normalized[(r, c)] = x_hat;
                output[(r, c)] = x_hat * gamma[(0, c)] + beta[(0, c)];
            }
        }

        self.state.record(LayerNormState {
            normalized,
            inv_std,
            gamma: gamma.clone(),
        });
        Ok(Value::Matrix(output))
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let state = self.state.current(self.operation_type())?;
        let g = d_output.as_matrix(self.operation_type())?;
        state.normalized.ensure_same_shape(g, self.operation_type())?;

        let (rows, cols) = (g.rows(), g.cols());
        let n = cols as f64;
        let mut d_gamma = Matrix::zeros(1, cols);
        let mut d_beta = Matrix::zeros(1, cols);
        let mut d_input = Matrix::zeros(rows, cols);

        for r in 0..rows {
            let g_row = g.row(r);
            let x_hat = state.normalized.row(r);
            let d_x_hat: Vec<f64> = (0..cols).map(|c| g_row[c] * state.gamma[(0, c)]).collect();
            let sum_d = d_x_hat.iter().sum::<f64>();
            let sum_d_xhat = d_x_hat.iter().zip(x_hat).map(|(d, x)| d * x).sum::<f64>();
            let scale = state.inv_std[r] / n;
            for c in 0..cols {
                d_beta[(0, c)] += g_row[c];
                d_gamma[(0, c)] += g_row[c] * x_hat[c];
                d_input[(r, c)] = scale * (n * d_x_hat[c] - sum_d - x_hat[c] * sum_d_xhat);
            }
        }

        Ok(BackwardResult::new()
            .with_input_gradient(d_input)
            .with_gamma_gradient(d_gamma)
            .with_beta_gradient(d_beta))
    }

    fn store(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.state.store(run_id, self.operation_type())
    }

    fn restore(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.state.restore(run_id, self.operation_type())
    }

    fn release(&mut self, run_id: RunId) {
        self.state.release(run_id);
    }
}
