use crate::error::NeuraGraphError;
use crate::tensor::DeepMatrix;
use std::ops::Index;

/// An ordered sequence of [`DeepMatrix`] stacks with one shared `[depth, rows, cols]`.
///
/// Used for batched stacks and for convolution filter banks.
#[derive(Debug, Clone, PartialEq)]
pub struct FourDimensionalMatrix {
    depth: usize,
    rows: usize,
    cols: usize,
    stacks: Vec<DeepMatrix>,
}

impl FourDimensionalMatrix {
    /// # Errors
    /// * `NeuraGraphError::EmptyStack` for an empty list.
    /// * `NeuraGraphError::ShapeMismatch` if the stacks disagree on shape.
    pub fn new(stacks: Vec<DeepMatrix>) -> Result<Self, NeuraGraphError> {
        let first = stacks.first().ok_or(NeuraGraphError::EmptyStack)?;
        let (depth, rows, cols) = (first.depth(), first.rows(), first.cols());
        for s in stacks.iter().skip(1) {
            first.ensure_same_shape(s, "FourDimensionalMatrix::new")?;
        }
        Ok(FourDimensionalMatrix {
            depth,
            rows,
            cols,
            stacks,
        })
    }

    pub fn empty(depth: usize, rows: usize, cols: usize) -> Self {
        FourDimensionalMatrix {
            depth,
            rows,
            cols,
            stacks: Vec::new(),
        }
    }

    pub fn zeros(count: usize, depth: usize, rows: usize, cols: usize) -> Self {
        FourDimensionalMatrix {
            depth,
            rows,
            cols,
            stacks: (0..count).map(|_| DeepMatrix::zeros(depth, rows, cols)).collect(),
        }
    }

    pub fn zeros_like(other: &FourDimensionalMatrix) -> Self {
        Self::zeros(other.count(), other.depth, other.rows, other.cols)
    }

    /// Number of stacks.
    pub fn count(&self) -> usize {
        self.stacks.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `[count, depth, rows, cols]`
    pub fn shape(&self) -> Vec<usize> {
        vec![self.count(), self.depth, self.rows, self.cols]
    }

    pub fn get(&self, index: usize) -> Option<&DeepMatrix> {
        self.stacks.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DeepMatrix> {
        self.stacks.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeepMatrix> {
        self.stacks.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, DeepMatrix> {
        self.stacks.iter_mut()
    }

    pub fn into_stacks(self) -> Vec<DeepMatrix> {
        self.stacks
    }

    pub fn add_assign(&mut self, other: &FourDimensionalMatrix) -> Result<(), NeuraGraphError> {
        if self.shape() != other.shape() {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
                operation: "FourDimensionalMatrix::add_assign".to_string(),
            });
        }
        for (a, b) in self.stacks.iter_mut().zip(other.stacks.iter()) {
            a.add_assign(b)?;
        }
        Ok(())
    }

    pub fn zip_map<F>(
        &self,
        other: &FourDimensionalMatrix,
        operation: &str,
        f: F,
    ) -> Result<FourDimensionalMatrix, NeuraGraphError>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.shape() != other.shape() {
            return Err(NeuraGraphError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
                operation: operation.to_string(),
            });
        }
        let stacks = self
            .stacks
            .iter()
            .zip(other.stacks.iter())
            .map(|(a, b)| a.zip_map(b, operation, &f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FourDimensionalMatrix {
            depth: self.depth,
            rows: self.rows,
            cols: self.cols,
            stacks,
        })
    }

    pub fn map<F>(&self, f: F) -> FourDimensionalMatrix
    where
        F: Fn(f64) -> f64,
    {
        FourDimensionalMatrix {
            depth: self.depth,
            rows: self.rows,
            cols: self.cols,
            stacks: self.stacks.iter().map(|s| s.map(&f)).collect(),
        }
    }

    pub fn sum(&self) -> f64 {
        self.stacks.iter().map(DeepMatrix::sum).sum()
    }
}

impl Index<usize> for FourDimensionalMatrix {
    type Output = DeepMatrix;

    fn index(&self, index: usize) -> &DeepMatrix {
        &self.stacks[index]
    }
}
