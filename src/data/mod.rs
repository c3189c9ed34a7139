//! # Data Layer
//!
//! In-memory representations: the phylogenetic tree, its derived covariance
//! matrix, and the validated observation set.

pub mod covariance;
pub mod observations;
pub mod tree;

pub use covariance::CovarianceMatrix;
pub use observations::{Dataset, Observation, Polarity};
pub use tree::PhyloTree;
