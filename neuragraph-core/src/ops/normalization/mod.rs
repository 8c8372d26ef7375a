//! Normalization kernels with learnable `Gamma`/`Beta` parameters.

pub mod layer_norm;

pub use layer_norm::{LayerNormOperation, DEFAULT_LAYER_NORM_EPSILON};
