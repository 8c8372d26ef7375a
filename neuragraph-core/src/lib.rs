//! # neuragraph-core
//!
//! Reverse-mode differentiation over an operation graph of matrix-valued nodes.
//!
//! Kernels implement [`operation::Operation`]; a [`graph::GraphBuilder`] wires
//! them by name into a [`graph::Graph`], whose backward pass runs every node
//! once all its consumers have contributed, in parallel across independent
//! branches. [`batch::BatchOperation`] replicates a per-sample kernel across a
//! batch dimension.

pub mod autograd;
pub mod batch;
pub mod graph;
pub mod operation;
pub mod ops;
pub mod tensor;
pub mod utils;

pub mod error;
pub use error::NeuraGraphError;

pub use batch::BatchOperation;
pub use graph::{BackwardReport, ExecutorConfig, Graph, GraphBuilder, NodeSpec};
pub use operation::{BackwardResult, GradientRole, Operation, RunId};
pub use tensor::{DeepMatrix, FourDimensionalMatrix, Matrix, Value};
