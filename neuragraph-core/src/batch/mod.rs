//! Batch-parallel wrapper around per-sample operations.

pub mod batch_operation;

pub use batch_operation::BatchOperation;
