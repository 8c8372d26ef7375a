//! # Operation graph
//!
//! - [`GraphBuilder`] / [`NodeSpec`]: declare leaves and operation nodes by name.
//! - [`Graph`]: the arena of [`OperationNode`]s with the forward chain and the
//!   dependency-counted, parallel backward scheduler.
//! - [`ContributionGate`]: per-node counter that lets only the final contributor
//!   schedule a node.
//! - [`ExecutorConfig`]: worker count and pass deadline.

pub mod builder;
pub mod config;
pub mod executor;
pub mod gate;
pub mod node;

pub use builder::{GraphBuilder, NodeSpec};
pub use config::ExecutorConfig;
pub use executor::{BackwardReport, Graph};
pub use gate::ContributionGate;
pub use node::{NodeId, OperationNode};
