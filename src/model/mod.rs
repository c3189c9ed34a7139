//! # Model Layer
//!
//! The phylogenetic mixed model: hyperparameters, the Gibbs chain kernel,
//! the parallel multi-chain fitter, and convergence diagnostics.

pub mod chain;
pub mod diagnostics;
pub mod fit;
pub mod parameters;

pub use fit::{ModelFit, COEF_OPPOSITE, INTERCEPT, SIGMA_PHYLO, SIGMA_RESID};
pub use parameters::ModelParams;
