//! Regularization kernels.

pub mod dropout;

pub use dropout::DropoutOperation;
