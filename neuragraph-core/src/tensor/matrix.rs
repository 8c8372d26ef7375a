// neuragraph-core/src/tensor/matrix.rs

use crate::error::NeuraGraphError;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MATRIX_ID: AtomicU64 = AtomicU64::new(1);

fn next_matrix_id() -> u64 {
    NEXT_MATRIX_ID.fetch_add(1, Ordering::Relaxed)
}

/// A dense, row-major rectangular block of `f64` values.
///
/// Every matrix carries a process-unique `id`. The id identifies the backing
/// storage, so cloning a matrix allocates a new id: a clone captured by a
/// checkpoint is a distinct, immutable snapshot of the original.
pub struct Matrix {
    id: u64,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates a `rows x cols` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Creates a `rows x cols` matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Matrix {
            id: next_matrix_id(),
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Creates a matrix from flattened row-major data.
    ///
    /// # Errors
    /// Returns `NeuraGraphError::TensorCreationError` if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, NeuraGraphError> {
        if data.len() != rows * cols {
            return Err(NeuraGraphError::TensorCreationError {
                data_len: data.len(),
                shape: vec![rows, cols],
            });
        }
        Ok(Matrix {
            id: next_matrix_id(),
            rows,
            cols,
            data,
        })
    }

    /// Creates a matrix from a list of rows.
    ///
    /// # Errors
    /// Returns `NeuraGraphError::ShapeMismatch` if the rows are ragged.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, NeuraGraphError> {
        let row_count = rows.len();
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(row_count * cols);
        for row in rows {
            if row.len() != cols {
                return Err(NeuraGraphError::ShapeMismatch {
                    expected: vec![cols],
                    actual: vec![row.len()],
                    operation: "Matrix::from_rows".to_string(),
                });
            }
            data.extend(row);
        }
        Self::from_vec(row_count, cols, data)
    }

    /// Creates a zero matrix with the same shape as `other`.
    pub fn zeros_like(other: &Matrix) -> Self {
        Self::zeros(other.rows, other.cols)
    }

    // --- Accessors ---

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> Vec<usize> {
        vec![self.rows, self.cols]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the element at `(row, col)`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Writes `value` at `(row, col)`.
    ///
    /// # Errors
    /// Returns `NeuraGraphError::IndexOutOfBounds` when the position is outside the matrix.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), NeuraGraphError> {
        if row >= self.rows || col >= self.cols {
            return Err(NeuraGraphError::IndexOutOfBounds {
                index: vec![row, col],
                shape: self.shape(),
            });
        }
        self.data[row * self.cols + col] = value;
        Ok(())
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let cols = self.cols;
        &mut self.data[row * cols..(row + 1) * cols]
    }

    /// Iterates over the rows as slices.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks(0) panics, an empty matrix simply has no rows to yield
        self.data.chunks(self.cols.max(1)).take(self.rows)
    }

    /// Iterates over all elements in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.data.iter_mut()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    // --- Arithmetic ---

    /// Checks that `other` has exactly the same shape as `self`.
    pub fn ensure_same_shape(
        &self,
        other: &Matrix,
        operation: &str,
    ) -> Result<(), NeuraGraphError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Applies `f` to every element, producing a new matrix.
    pub fn map<F>(&self, f: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            id: next_matrix_id(),
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Combines two same-shaped matrices element by element.
    pub fn zip_map<F>(
        &self,
        other: &Matrix,
        operation: &str,
        f: F,
    ) -> Result<Matrix, NeuraGraphError>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.ensure_same_shape(other, operation)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Matrix::from_vec(self.rows, self.cols, data)
    }

    /// Element-wise sum `self + other`.
    pub fn add(&self, other: &Matrix) -> Result<Matrix, NeuraGraphError> {
        self.zip_map(other, "Matrix::add", |a, b| a + b)
    }

    /// In-place element-wise accumulation `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<(), NeuraGraphError> {
        self.ensure_same_shape(other, "Matrix::add_assign")?;
        self.data
            .iter_mut()
            .zip(other.data.iter())
            .for_each(|(a, &b)| *a += b);
        Ok(())
    }

    /// Element-wise (Hadamard) product.
    pub fn hadamard(&self, other: &Matrix) -> Result<Matrix, NeuraGraphError> {
        self.zip_map(other, "Matrix::hadamard", |a, b| a * b)
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        self.map(|x| x * factor)
    }

    pub fn transpose(&self) -> Matrix {
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..self.cols {
            for r in 0..self.rows {
                data.push(self.data[r * self.cols + c]);
            }
        }
        Matrix {
            id: next_matrix_id(),
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    /// Matrix product `self (m x k) * other (k x n)`.
    ///
    /// # Errors
    /// Returns `NeuraGraphError::ShapeMismatch` when the inner dimensions differ.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix, NeuraGraphError> {
        if self.cols != other.rows {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: vec![self.cols, other.cols],
                actual: other.shape(),
                operation: "Matrix::matmul".to_string(),
            });
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                if a == 0.0 {
                    continue;
                }
                let other_row = other.row(k);
                let out_row = out.row_mut(i);
                for (o, &b) in out_row.iter_mut().zip(other_row.iter()) {
                    *o += a * b;
                }
            }
        }
        Ok(out)
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

impl Clone for Matrix {
    fn clone(&self) -> Self {
        Matrix {
            id: next_matrix_id(),
            rows: self.rows,
            cols: self.cols,
            data: self.data.clone(),
        }
    }
}

/// Equality compares shape and contents, never ids.
impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.data == other.data
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("id", &self.id)
            .field("shape", &(self.rows, self.cols))
            .field("data", &self.data)
            .finish()
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(
            row < self.rows && col < self.cols,
            "Matrix index ({}, {}) out of bounds for shape ({}, {})",
            row,
            col,
            self.rows,
            self.cols
        );
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(
            row < self.rows && col < self.cols,
            "Matrix index ({}, {}) out of bounds for shape ({}, {})",
            row,
            col,
            self.rows,
            self.cols
        );
        &mut self.data[row * self.cols + col]
    }
}

#[cfg(test)]
#[path = "matrix_test.rs"]
mod tests;
