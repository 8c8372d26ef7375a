//! # Activation Functions
//!
//! Element-wise (and row-wise) non-linearities implementing the
//! [`Operation`](crate::operation::Operation) contract. All of them populate
//! only the `Input` gradient role.

pub mod leaky_relu;
pub mod sigmoid;
pub mod softmax;
pub mod stretched_sigmoid;
pub mod tanh;

pub use leaky_relu::LeakyReluOperation;
pub use sigmoid::SigmoidOperation;
pub use softmax::SoftmaxOperation;
pub use stretched_sigmoid::StretchedSigmoidOperation;
pub use tanh::TanhOperation;
