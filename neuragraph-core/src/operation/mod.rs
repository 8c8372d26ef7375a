//! # Operation contract
//!
//! Everything a graph node needs from a kernel:
//!
//! - [`Operation`]: forward / backward / store / restore.
//! - [`BackwardResult`] and [`GradientRole`]: the sparse gradient bundle a
//!   backward call returns and the roles used to route it upstream.
//! - [`CheckpointStore`], [`CheckpointGuard`] and [`RunId`]: run-keyed
//!   checkpoints used by `store`/`restore`.
//! - [`SavedState`]: live forward state plus checkpoints, shared by kernels.

pub mod backward_result;
pub mod checkpoint;
pub mod operation_trait;
pub mod saved_state;

pub use backward_result::{BackwardResult, GradientRole};
pub use checkpoint::{CheckpointGuard, CheckpointStore, ReleaseCheckpoint, RunId};
pub use operation_trait::{check_arity, Operation};
pub use saved_state::SavedState;
