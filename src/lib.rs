//! # Phyloreg Library Root
//!
//! Phylogenetically-aware Bayesian regression for intergenic-region lengths:
//! converts a phylogenetic tree into a covariance structure, fits a Gaussian
//! hierarchical model with a phylogenetically structured random effect, and
//! summarizes the posterior into one result row per taxonomic group.
//!
//! ## Module Structure
//! ```text
//! phyloreg
//! ├── data       # Tree, covariance matrix, observations
//! ├── io         # Table reading, output artifacts
//! ├── model      # Gibbs sampler, parallel chains, diagnostics
//! ├── report     # Posterior summaries, result rows
//! ├── pipelines  # Per-group orchestration, batch runner
//! └── utils      # Descriptive-statistics helpers
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod report;
pub mod utils;
