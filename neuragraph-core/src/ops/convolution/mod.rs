//! Convolution over deep (multi-channel) inputs.

pub mod deep_convolution;

pub use deep_convolution::DeepConvolutionOperation;
