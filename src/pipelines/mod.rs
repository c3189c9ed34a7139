//! # Pipelines
//!
//! High-level orchestration: the per-group stage machine and the batch
//! runner over named groups.

pub mod batch;
pub mod group;

pub use batch::{run_batch, BatchOutcome};
pub use group::GroupPipeline;
