use crate::operation::RunId;
use thiserror::Error;

/// Custom error type for the NeuraGraph runtime.
///
/// Every error is fatal to the pass that produced it: kernels fail fast and the
/// executor stops dispatching new work as soon as one node reports an error, so a
/// partially accumulated gradient buffer is never handed to the optimizer.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum NeuraGraphError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Depth mismatch: expected {expected}, got {actual} during operation {operation}")]
    DepthMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Value kind mismatch: expected {expected}, got {actual} during operation {operation}")]
    ValueKindMismatch {
        expected: &'static str,
        actual: &'static str,
        operation: String,
    },

    #[error("Operation {operation} expects {expected} inputs, got {actual}")]
    ArityMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreationError { data_len: usize, shape: Vec<usize> },

    #[error("Cannot stack an empty list of values")]
    EmptyStack,

    #[error("No checkpoint stored for run {run_id} in operation {operation}")]
    MissingCheckpoint { run_id: RunId, operation: String },

    #[error("Backward called on operation {operation} before a forward pass recorded its state")]
    MissingForwardState { operation: String },

    #[error("Batch size mismatch: configured {configured}, input carries {actual}")]
    BatchSizeMismatch { configured: usize, actual: usize },

    #[error("Unknown name '{0}' in the computation graph")]
    UnknownName(String),

    #[error("Name '{0}' is declared more than once in the computation graph")]
    DuplicateName(String),

    #[error("Cycle detected in the computation graph involving node '{0}'")]
    CycleDetected(String),

    #[error("Backward pass stalled: nodes {pending:?} never received all their gradient contributions")]
    GraphStalled { pending: Vec<String> },

    #[error("Backward pass exceeded its deadline of {deadline_ms} ms with nodes {pending:?} still pending")]
    BackwardTimeout { deadline_ms: u128, pending: Vec<String> },

    #[error("Backward invoked more than once for node '{0}' in a single pass")]
    BackwardReentered(String),

    #[error("Gradient contribution delivered twice from node '{consumer}' to node '{producer}'")]
    DuplicateContribution { consumer: String, producer: String },

    #[error("No value fed for graph input '{0}'")]
    MissingFeed(String),

    #[error("Seed gradient targets '{0}', which is not part of the graph")]
    UnknownSeed(String),

    #[error("Failed to acquire {lock_type} lock: {reason}")]
    LockError { lock_type: String, reason: String },

    #[error("Failed to build worker pool: {0}")]
    ThreadPoolError(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}
