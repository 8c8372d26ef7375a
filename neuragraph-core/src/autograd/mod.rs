//! Gradient verification utilities.

pub mod grad_check;

pub use grad_check::{check_operation_gradients, GradCheckError, GradCheckTolerance};
