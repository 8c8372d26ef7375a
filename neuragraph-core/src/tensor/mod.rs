//! # Tensor containers
//!
//! - [`Matrix`]: dense row-major rectangle of `f64`.
//! - [`DeepMatrix`]: fixed-depth stack of equally shaped matrices.
//! - [`FourDimensionalMatrix`]: stack of stacks.
//! - [`Value`]: the sum type carried along graph edges.

pub mod deep_matrix;
pub mod four_dimensional;
pub mod matrix;
pub mod value;

pub use deep_matrix::DeepMatrix;
pub use four_dimensional::FourDimensionalMatrix;
pub use matrix::Matrix;
pub use value::Value;
