//! # Operation kernels
//!
//! Concrete implementations of [`Operation`](crate::operation::Operation),
//! grouped by family. Each kernel records the forward state its backward pass
//! needs in a [`SavedState`](crate::operation::SavedState) and returns only the
//! gradient roles it is responsible for.

pub mod activation;
pub mod arithmetic;
pub mod convolution;
pub mod normalization;
pub mod regularization;
