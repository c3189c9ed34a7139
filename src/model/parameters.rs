//! # Model Parameters
//!
//! Pure data for sampler settings and prior hyperparameters.
//!
//! The model is a Gaussian hierarchical regression on the log10 scale:
//!
//! ```text
//! y_i = beta_0 + beta_1 * [polarity_i == opposite] + u_{taxon(i)} + e_i
//! u ~ N(0, sigma_p^2 * C)      phylogenetic random effect, C fixed
//! e ~ N(0, sigma_e^2 * I)      residual
//! ```
//!
//! The random effect's correlation structure is the tree covariance matrix
//! `C` and is not estimated; its single free parameter is the scalar
//! variance `sigma_p^2` (phylogenetic signal strength). Priors are
//! conjugate: `beta ~ N(0, beta_prior_var * I)` and both variances get
//! `Inv-Gamma(variance_prior_shape, variance_prior_rate)`.

use serde::{Deserialize, Serialize};

use crate::error::{PhyloError, Result};

/// Minimum distinct taxa for the random effect to be identifiable.
pub const MIN_TAXA: usize = 2;
/// Minimum observations for both variance components to be estimable.
pub const MIN_OBSERVATIONS: usize = 4;

/// Sampler settings and prior hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    /// Number of independent chains.
    pub chains: usize,
    /// Post-warmup draws per chain.
    pub iterations: usize,
    /// Warmup iterations per chain, discarded before recording.
    pub warmup: usize,
    /// Base seed; chain k is initialized from `seed + k`.
    pub seed: u64,
    /// Prior variance of the fixed effects (weakly informative).
    pub beta_prior_var: f64,
    /// Shape of the inverse-gamma prior on both variance components.
    pub variance_prior_shape: f64,
    /// Rate of the inverse-gamma prior on both variance components.
    pub variance_prior_rate: f64,
    /// Log base of the response scale; used for back-transformation only.
    pub log_base: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            chains: 4,
            iterations: 2000,
            warmup: 1000,
            seed: 42,
            beta_prior_var: 100.0,
            variance_prior_shape: 0.01,
            variance_prior_rate: 0.01,
            log_base: 10.0,
        }
    }
}

impl ModelParams {
    /// Validate settings before a fit.
    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            return Err(PhyloError::fit("at least one chain is required"));
        }
        if self.iterations == 0 {
            return Err(PhyloError::fit("at least one post-warmup draw is required"));
        }
        if self.beta_prior_var <= 0.0
            || self.variance_prior_shape <= 0.0
            || self.variance_prior_rate <= 0.0
        {
            return Err(PhyloError::fit("prior hyperparameters must be positive"));
        }
        if self.log_base <= 1.0 {
            return Err(PhyloError::fit("log base must exceed 1"));
        }
        Ok(())
    }

    /// Seed for one chain's RNG.
    pub fn chain_seed(&self, chain: usize) -> u64 {
        self.seed.wrapping_add(chain as u64)
    }
}
