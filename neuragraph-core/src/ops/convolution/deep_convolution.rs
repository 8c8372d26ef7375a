use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::{DeepMatrix, FourDimensionalMatrix, Matrix, Value};

/// Valid (no padding), stride-1 cross-correlation of a deep input with a filter bank.
///
/// * input: `DeepMatrix` of `channels x height x width`
/// * filters: `FourDimensionalMatrix` of `filters x channels x kh x kw`
/// * output: `DeepMatrix` of `filters x (height - kh + 1) x (width - kw + 1)`
#[derive(Debug, Clone, Default)]
pub struct DeepConvolutionOperation {
    operands: SavedState<(DeepMatrix, FourDimensionalMatrix)>,
}

impl DeepConvolutionOperation {
    pub fn new() -> Self {
        Self::default()
    }

    fn output_dims(
        &self,
        input: &DeepMatrix,
        filters: &FourDimensionalMatrix,
    ) -> Result<(usize, usize), NeuraGraphError> {
        if filters.depth() != input.depth() {
            return Err(NeuraGraphError::DepthMismatch {
                expected: input.depth(),
                actual: filters.depth(),
                operation: self.operation_type().to_string(),
            });
        }
        if filters.rows() == 0
            || filters.cols() == 0
            || filters.rows() > input.rows()
            || filters.cols() > input.cols()
        {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: vec![input.rows(), input.cols()],
                actual: vec![filters.rows(), filters.cols()],
                operation: self.operation_type().to_string(),
            });
        }
        Ok((
            input.rows() - filters.rows() + 1,
            input.cols() - filters.cols() + 1,
        ))
    }
}

impl Operation for DeepConvolutionOperation {
    fn operation_type(&self) -> &'static str {
        "DeepConvolution"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::DeepInput, GradientRole::Filters]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 2, self.operation_type())?;
        let input = inputs[0].as_deep(self.operation_type())?;
        let filters = inputs[1].as_four_dimensional(self.operation_type())?;
        let (out_rows, out_cols) = self.output_dims(input, filters)?;
        let (kh, kw) = (filters.rows(), filters.cols());

        let mut maps = Vec::with_capacity(filters.count());
        for filter in filters.iter() {
            let mut out = Matrix::zeros(out_rows, out_cols);
            for (channel, kernel) in input.iter().zip(filter.iter()) {
                for y in 0..out_rows {
                    for x in 0..out_cols {
                        let mut acc = 0.0;
                        for i in 0..kh {
                            for j in 0..kw {
                                acc += channel[(y + i, x + j)] * kernel[(i, j)];
                            }
                        }
                        out[(y, x)] += acc;
                    }
                }
            }
            maps.push(out);
        }

        let output = if maps.is_empty() {
            DeepMatrix::empty(out_rows, out_cols)
        } else {
            DeepMatrix::new(maps)?
        };
        self.operands.record((input.clone(), filters.clone()));
        Ok(Value::Deep(output))
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let (input, filters) = self.operands.current(self.operation_type())?;
        let g = d_output.as_deep(self.operation_type())?;
        let (out_rows, out_cols) = self.output_dims(input, filters)?;
        let expected = vec![filters.count(), out_rows, out_cols];
        if g.shape() != expected {
            return Err(NeuraGraphError::ShapeMismatch {
                expected,
                actual: g.shape(),
                operation: self.operation_type().to_string(),
            });
        }
        let (kh, kw) = (filters.rows(), filters.cols());

        let mut d_input = DeepMatrix::zeros_like(input);
        let mut d_filters = FourDimensionalMatrix::zeros_like(filters);
        for (f, (filter, g_map)) in filters.iter().zip(g.iter()).enumerate() {
            for c in 0..input.depth() {
                let channel = &input[c];
                let kernel = &filter[c];
                for y in 0..out_rows {
                    for x in 0..out_cols {
                        let upstream = g_map[(y, x)];
                        if upstream == 0.0 {
                            continue;
                        }
                        for i in 0..kh {
                            for j in 0..kw {
                                if let Some(m) = d_filters.get_mut(f).and_then(|s| s.get_mut(c)) {
                                    m[(i, j)] += upstream * channel[(y + i, x + j)];
                                }
                                if let Some(m) = d_input.get_mut(c) {
                                    m[(y + i, x + j)] += upstream * kernel[(i, j)];
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(BackwardResult::new()
            .with_deep_input_gradient(d_input)
            .with_filters_gradient(d_filters))
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
