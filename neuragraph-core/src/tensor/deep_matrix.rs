use crate::error::NeuraGraphError;
use crate::tensor::Matrix;
use std::ops::Index;

/// An ordered stack of matrices sharing one `rows x cols` shape.
///
/// The depth (number of matrices) is fixed at construction. Members can be
/// mutated in place but never added or removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepMatrix {
    rows: usize,
    cols: usize,
    matrices: Vec<Matrix>,
}

impl DeepMatrix {
    /// Builds a stack from a non-empty list of equally shaped matrices.
    ///
    /// # Errors
    /// * `NeuraGraphError::EmptyStack` if `matrices` is empty (use [`DeepMatrix::empty`]).
    /// * `NeuraGraphError::ShapeMismatch` if the members disagree on shape.
    pub fn new(matrices: Vec<Matrix>) -> Result<Self, NeuraGraphError> {
        let first = matrices.first().ok_or(NeuraGraphError::EmptyStack)?;
        let (rows, cols) = (first.rows(), first.cols());
        for m in matrices.iter().skip(1) {
            first.ensure_same_shape(m, "DeepMatrix::new")?;
        }
        Ok(DeepMatrix {
            rows,
            cols,
            matrices,
        })
    }

    /// A zero-depth stack that still remembers its member shape.
    pub fn empty(rows: usize, cols: usize) -> Self {
        DeepMatrix {
            rows,
            cols,
            matrices: Vec::new(),
        }
    }

    pub fn zeros(depth: usize, rows: usize, cols: usize) -> Self {
        DeepMatrix {
            rows,
            cols,
            matrices: (0..depth).map(|_| Matrix::zeros(rows, cols)).collect(),
        }
    }

    pub fn zeros_like(other: &DeepMatrix) -> Self {
        Self::zeros(other.depth(), other.rows, other.cols)
    }

    pub fn depth(&self) -> usize {
        self.matrices.len()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `[depth, rows, cols]`
    pub fn shape(&self) -> Vec<usize> {
        vec![self.depth(), self.rows, self.cols]
    }

    pub fn get(&self, index: usize) -> Option<&Matrix> {
        self.matrices.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Matrix> {
        self.matrices.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Matrix> {
        self.matrices.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Matrix> {
        self.matrices.iter_mut()
    }

    pub fn into_matrices(self) -> Vec<Matrix> {
        self.matrices
    }

    pub fn ensure_same_shape(
        &self,
        other: &DeepMatrix,
        operation: &str,
    ) -> Result<(), NeuraGraphError> {
        if self.shape() != other.shape() {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    pub fn map<F>(&self, f: F) -> DeepMatrix
    where
        F: Fn(f64) -> f64,
    {
        DeepMatrix {
            rows: self.rows,
            cols: self.cols,
            matrices: self.matrices.iter().map(|m| m.map(&f)).collect(),
        }
    }

    /// Combines two same-shaped stacks element by element.
    pub fn zip_map<F>(
        &self,
        other: &DeepMatrix,
        operation: &str,
        f: F,
    ) -> Result<DeepMatrix, NeuraGraphError>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.ensure_same_shape(other, operation)?;
        let matrices = self
            .matrices
            .iter()
            .zip(other.matrices.iter())
            .map(|(a, b)| a.zip_map(b, operation, &f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DeepMatrix {
            rows: self.rows,
            cols: self.cols,
            matrices,
        })
    }

    /// Element-wise sum of two stacks of identical shape.
    pub fn add(&self, other: &DeepMatrix) -> Result<DeepMatrix, NeuraGraphError> {
        let mut out = self.clone();
        out.add_assign(other)?;
        Ok(out)
    }

    /// In-place element-wise accumulation, depth by depth.
    pub fn add_assign(&mut self, other: &DeepMatrix) -> Result<(), NeuraGraphError> {
        self.ensure_same_shape(other, "DeepMatrix::add_assign")?;
        for (a, b) in self.matrices.iter_mut().zip(other.matrices.iter()) {
            a.add_assign(b)?;
        }
        Ok(())
    }

    pub fn sum(&self) -> f64 {
        self.matrices.iter().map(Matrix::sum).sum()
    }
}

impl Index<usize> for DeepMatrix {
    type Output = Matrix;

    fn index(&self, index: usize) -> &Matrix {
        &self.matrices[index]
    }
}

impl<'a> IntoIterator for &'a DeepMatrix {
    type Item = &'a Matrix;
    type IntoIter = std::slice::Iter<'a, Matrix>;

    fn into_iter(self) -> Self::IntoIter {
        self.matrices.iter()
    }
}

#[cfg(test)]
#[path = "deep_matrix_test.rs"]
mod tests;
