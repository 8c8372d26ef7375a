//! # Arithmetic operations
//!
//! Binary kernels populate the `LeftInput`/`RightInput` roles; [`BiasAddOperation`]
//! populates `Input` and `Bias`.

pub mod bias_add;
pub mod hadamard;
pub mod matrix_add;
pub mod matrix_multiply;

pub use bias_add::BiasAddOperation;
pub use hadamard::HadamardProductOperation;
pub use matrix_add::MatrixAddOperation;
pub use matrix_multiply::MatrixMultiplyOperation;
