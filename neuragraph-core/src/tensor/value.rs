use crate::error::NeuraGraphError;
use crate::tensor::{DeepMatrix, FourDimensionalMatrix, Matrix};

/// Any tensor-like value that can flow along a graph edge.
///
/// Operations receive their inputs as `&[Value]` and return a `Value`, so the
/// executor can route outputs and gradients without knowing each kernel's
/// concrete signature.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Matrix(Matrix),
    Deep(DeepMatrix),
    FourDimensional(FourDimensionalMatrix),
}

impl Value {
    /// Human readable name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Matrix(_) => "Matrix",
            Value::Deep(_) => "DeepMatrix",
            Value::FourDimensional(_) => "FourDimensionalMatrix",
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Matrix(m) => m.shape(),
            Value::Deep(d) => d.shape(),
            Value::FourDimensional(f) => f.shape(),
        }
    }

    pub fn zeros_like(&self) -> Value {
        match self {
            Value::Matrix(m) => Value::Matrix(Matrix::zeros_like(m)),
            Value::Deep(d) => Value::Deep(DeepMatrix::zeros_like(d)),
            Value::FourDimensional(f) => {
                Value::FourDimensional(FourDimensionalMatrix::zeros_like(f))
            }
        }
    }

    pub fn map<F>(&self, f: F) -> Value
    where
        F: Fn(f64) -> f64,
    {
        match self {
            Value::Matrix(m) => Value::Matrix(m.map(f)),
            Value::Deep(d) => Value::Deep(d.map(f)),
            Value::FourDimensional(x) => Value::FourDimensional(x.map(f)),
        }
    }

    /// Combines two values of the same kind and shape element by element.
    pub fn zip_map<F>(&self, other: &Value, operation: &str, f: F) -> Result<Value, NeuraGraphError>
    where
        F: Fn(f64, f64) -> f64,
    {
        match (self, other) {
            (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(a.zip_map(b, operation, f)?)),
            (Value::Deep(a), Value::Deep(b)) => Ok(Value::Deep(a.zip_map(b, operation, f)?)),
            (Value::FourDimensional(a), Value::FourDimensional(b)) => {
                Ok(Value::FourDimensional(a.zip_map(b, operation, f)?))
            }
            (a, b) => Err(kind_mismatch(a.kind(), b, operation)),
        }
    }

    /// All elements in row-major order, outermost dimension first.
    pub fn flatten(&self) -> Vec<f64> {
        match self {
            Value::Matrix(m) => m.to_vec(),
            Value::Deep(d) => d.iter().flat_map(|m| m.iter().copied()).collect(),
            Value::FourDimensional(f) => f
                .iter()
                .flat_map(|d| d.iter().flat_map(|m| m.iter().copied()))
                .collect(),
        }
    }

    /// Builds a value with the same kind and shape as `self` from flattened data.
    ///
    /// # Errors
    /// `TensorCreationError` if `data` has the wrong length.
    pub fn from_flat_like(&self, data: &[f64]) -> Result<Value, NeuraGraphError> {
        let expected: usize = self.shape().iter().product();
        if data.len() != expected {
            return Err(NeuraGraphError::TensorCreationError {
                data_len: data.len(),
                shape: self.shape(),
            });
        }
        let mut offset = 0;
        let mut refill = |m: &Matrix| -> Matrix {
            let mut out = Matrix::zeros_like(m);
            let n = out.len();
            out.as_mut_slice().copy_from_slice(&data[offset..offset + n]);
            offset += n;
            out
        };
        Ok(match self {
            Value::Matrix(m) => Value::Matrix(refill(m)),
            Value::Deep(d) => {
                let matrices: Vec<Matrix> = d.iter().map(&mut refill).collect();
                if matrices.is_empty() {
                    Value::Deep(d.clone())
                } else {
                    Value::Deep(DeepMatrix::new(matrices)?)
                }
            }
            Value::FourDimensional(f) => {
                let mut stacks = Vec::with_capacity(f.count());
                for d in f.iter() {
                    let matrices: Vec<Matrix> = d.iter().map(&mut refill).collect();
                    stacks.push(if matrices.is_empty() {
                        d.clone()
                    } else {
                        DeepMatrix::new(matrices)?
                    });
                }
                if stacks.is_empty() {
                    Value::FourDimensional(f.clone())
                } else {
                    Value::FourDimensional(FourDimensionalMatrix::new(stacks)?)
                }
            }
        })
    }

    pub fn sum(&self) -> f64 {
        match self {
            Value::Matrix(m) => m.sum(),
            Value::Deep(d) => d.sum(),
            Value::FourDimensional(f) => f.sum(),
        }
    }

    /// Element-wise accumulation of `other` into `self`.
    ///
    /// # Errors
    /// Returns `ValueKindMismatch` when the variants differ and `ShapeMismatch`
    /// when the shapes differ.
    pub fn add_assign(&mut self, other: &Value) -> Result<(), NeuraGraphError> {
        match (self, other) {
            (Value::Matrix(a), Value::Matrix(b)) => a.add_assign(b),
            (Value::Deep(a), Value::Deep(b)) => a.add_assign(b),
            (Value::FourDimensional(a), Value::FourDimensional(b)) => a.add_assign(b),
            (a, b) => Err(NeuraGraphError::ValueKindMismatch {
                expected: a.kind(),
                actual: b.kind(),
                operation: "Value::add_assign".to_string(),
            }),
        }
    }

    // --- Typed accessors ---

    pub fn as_matrix(&self, operation: &str) -> Result<&Matrix, NeuraGraphError> {
        match self {
            Value::Matrix(m) => Ok(m),
            other => Err(kind_mismatch("Matrix", other, operation)),
        }
    }

    pub fn as_deep(&self, operation: &str) -> Result<&DeepMatrix, NeuraGraphError> {
        match self {
            Value::Deep(d) => Ok(d),
            other => Err(kind_mismatch("DeepMatrix", other, operation)),
        }
    }

    pub fn as_four_dimensional(
        &self,
        operation: &str,
    ) -> Result<&FourDimensionalMatrix, NeuraGraphError> {
        match self {
            Value::FourDimensional(f) => Ok(f),
            other => Err(kind_mismatch("FourDimensionalMatrix", other, operation)),
        }
    }

    // --- Batch helpers ---

    /// Number of entries along the outermost (batch) dimension.
    ///
    /// A `Matrix` has no batch dimension and yields `None`.
    pub fn batch_len(&self) -> Option<usize> {
        match self {
            Value::Matrix(_) => None,
            Value::Deep(d) => Some(d.depth()),
            Value::FourDimensional(f) => Some(f.count()),
        }
    }

    /// Splits the outermost dimension into one value per entry.
    pub fn unstack(&self, operation: &str) -> Result<Vec<Value>, NeuraGraphError> {
        match self {
            Value::Deep(d) => Ok(d.iter().cloned().map(Value::Matrix).collect()),
            Value::FourDimensional(f) => Ok(f.iter().cloned().map(Value::Deep).collect()),
            Value::Matrix(_) => Err(NeuraGraphError::UnsupportedOperation(format!(
                "{}: a Matrix has no batch dimension to unstack",
                operation
            ))),
        }
    }

    /// Stacks per-entry values along a new outermost dimension.
    ///
    /// Matrices become a `DeepMatrix`, stacks become a `FourDimensionalMatrix`.
    pub fn stack(values: Vec<Value>, operation: &str) -> Result<Value, NeuraGraphError> {
        let first_kind = values.first().ok_or(NeuraGraphError::EmptyStack)?.kind();
        match first_kind {
            "Matrix" => {
                let matrices = values
                    .into_iter()
                    .map(|v| match v {
                        Value::Matrix(m) => Ok(m),
                        other => Err(kind_mismatch(first_kind, &other, operation)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Deep(DeepMatrix::new(matrices)?))
            }
            "DeepMatrix" => {
                let stacks = values
                    .into_iter()
                    .map(|v| match v {
                        Value::Deep(d) => Ok(d),
                        other => Err(kind_mismatch(first_kind, &other, operation)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::FourDimensional(FourDimensionalMatrix::new(stacks)?))
            }
            _ => Err(NeuraGraphError::UnsupportedOperation(format!(
                "{}: cannot stack FourDimensionalMatrix values any further",
                operation
            ))),
        }
    }
}

fn kind_mismatch(expected: &'static str, actual: &Value, operation: &str) -> NeuraGraphError {
    NeuraGraphError::ValueKindMismatch {
        expected,
        actual: actual.kind(),
        operation: operation.to_string(),
    }
}

impl From<Matrix> for Value {
    fn from(m: Matrix) -> Self {
        Value::Matrix(m)
    }
}

impl From<DeepMatrix> for Value {
    fn from(d: DeepMatrix) -> Self {
        Value::Deep(d)
    }
}

impl From<FourDimensionalMatrix> for Value {
    fn from(f: FourDimensionalMatrix) -> Self {
        Value::FourDimensional(f)
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod tests;
