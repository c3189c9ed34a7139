//! # Model Fitting
//!
//! Validates the design, derives the shared precision structures, runs N
//! independent Gibbs chains in parallel on the rayon pool, and merges their
//! draws after all chains complete (the parallel collect is the merge
//! barrier). Chains share the design read-only; each owns its draw buffer.
//!
//! A chain whose draws are non-finite or whose coefficient sequence collapses
//! to zero variance fails the whole fit; mixing diagnostics (split-R-hat,
//! ESS) are recorded as warnings on the fit.

use nalgebra::{Cholesky, DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::covariance::CovarianceMatrix;
use crate::data::observations::{Dataset, Polarity};
use crate::error::{PhyloError, Result};
use crate::model::chain::{FitData, GibbsChain};
use crate::model::diagnostics::{ess, split_rhat};
use crate::model::parameters::{ModelParams, MIN_OBSERVATIONS, MIN_TAXA};

/// Reported name of the intercept.
pub const INTERCEPT: &str = "Intercept";
/// Reported name of the opposite-vs-same coefficient. The reporter fails if
/// this name is absent from a fit, which guards against a wrong baseline.
pub const COEF_OPPOSITE: &str = "polarity_opposite";
/// Reported name of the phylogenetic standard deviation.
pub const SIGMA_PHYLO: &str = "sigma_phylo";
/// Reported name of the residual standard deviation.
pub const SIGMA_RESID: &str = "sigma_resid";

/// All monitored parameters, in report order.
pub const PARAM_NAMES: [&str; 4] = [INTERCEPT, COEF_OPPOSITE, SIGMA_PHYLO, SIGMA_RESID];

/// Split-R-hat above this is reported as a mixing warning.
const RHAT_WARN: f64 = 1.05;
/// Merged ESS below this is reported as a mixing warning.
const ESS_WARN: f64 = 100.0;

/// Post-warmup draws of one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDraws {
    pub intercept: Vec<f64>,
    pub coef_opposite: Vec<f64>,
    pub sigma_phylo: Vec<f64>,
    pub sigma_resid: Vec<f64>,
}

impl ChainDraws {
    fn with_capacity(n: usize) -> Self {
        Self {
            intercept: Vec::with_capacity(n),
            coef_opposite: Vec::with_capacity(n),
            sigma_phylo: Vec::with_capacity(n),
            sigma_resid: Vec::with_capacity(n),
        }
    }

    /// Draw sequence for a monitored parameter name.
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        match name {
            INTERCEPT => Some(&self.intercept),
            COEF_OPPOSITE => Some(&self.coef_opposite),
            SIGMA_PHYLO => Some(&self.sigma_phylo),
            SIGMA_RESID => Some(&self.sigma_resid),
            _ => None,
        }
    }

    fn is_degenerate(&self) -> Option<String> {
        for name in PARAM_NAMES {
            let series = self.series(name).expect("known parameter");
            if series.iter().any(|v| !v.is_finite()) {
                return Some(format!("non-finite draws for {}", name));
            }
        }
        let n = self.coef_opposite.len() as f64;
        let mean = self.coef_opposite.iter().sum::<f64>() / n;
        let var = self
            .coef_opposite
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / n;
        if var <= 0.0 {
            return Some(format!("{} draws collapsed to a constant", COEF_OPPOSITE));
        }
        None
    }
}

/// Convergence context for one monitored parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDiagnostics {
    pub name: String,
    pub ess: f64,
    pub rhat: f64,
}

/// A fitted model: posterior draws plus the fixed design metadata.
/// Created once per group, serialized, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFit {
    /// Names of the fixed effects, baseline encoding `[Intercept, opposite]`.
    pub fixed_effects: Vec<String>,
    /// Taxa backing the random effect, in covariance order.
    pub taxa: Vec<String>,
    pub n_obs: usize,
    pub params: ModelParams,
    pub chains: Vec<ChainDraws>,
    pub diagnostics: Vec<ParamDiagnostics>,
    pub warnings: Vec<String>,
}

impl ModelFit {
    pub fn n_taxa(&self) -> usize {
        self.taxa.len()
    }

    /// Log base of the response scale.
    pub fn log_base(&self) -> f64 {
        self.params.log_base
    }

    /// Merged post-warmup draws of one parameter across all chains.
    pub fn merged_draws(&self, name: &str) -> Option<Vec<f64>> {
        let mut merged = Vec::new();
        for chain in &self.chains {
            merged.extend_from_slice(chain.series(name)?);
        }
        Some(merged)
    }

    /// Whether the fit carries a named fixed effect.
    pub fn has_fixed_effect(&self, name: &str) -> bool {
        self.fixed_effects.iter().any(|f| f == name)
    }
}

/// Fit the phylogenetic mixed model.
///
/// The covariance matrix is subset to the observed taxa, inverted once, and
/// shared by reference across chains. Fails fast when the design is too small
/// for the random-effect structure to be identifiable.
pub fn fit(
    dataset: &Dataset,
    covariance: &CovarianceMatrix,
    params: &ModelParams,
) -> Result<ModelFit> {
    params.validate()?;
    if dataset.n_taxa() < MIN_TAXA {
        return Err(PhyloError::fit(format!(
            "{} taxa with observations; at least {} are required for the phylogenetic random effect",
            dataset.n_taxa(),
            MIN_TAXA
        )));
    }
    if dataset.n_obs() < MIN_OBSERVATIONS {
        return Err(PhyloError::fit(format!(
            "{} observations; at least {} are required",
            dataset.n_obs(),
            MIN_OBSERVATIONS
        )));
    }

    let sub = covariance.subset(dataset.taxa())?;
    let chol = Cholesky::new(sub.matrix().clone()).ok_or_else(|| {
        PhyloError::fit(
            "tree covariance matrix is not positive definite; \
             check for zero-length terminal branches",
        )
    })?;
    let c_inv = chol.inverse();

    let data = build_design(dataset, &sub, c_inv);
    debug!(
        n_obs = data.n_obs(),
        n_taxa = data.n_taxa(),
        chains = params.chains,
        "starting chains"
    );

    // One rayon task per chain, bounded by the global pool; collecting is
    // the merge barrier, so posterior extraction never sees a partial chain.
    let chains: Vec<ChainDraws> = (0..params.chains)
        .into_par_iter()
        .map(|k| run_chain(params.chain_seed(k), &data, params))
        .collect();

    for (k, chain) in chains.iter().enumerate() {
        if let Some(reason) = chain.is_degenerate() {
            return Err(PhyloError::fit(format!(
                "chain {} failed to produce usable draws: {}",
                k + 1,
                reason
            )));
        }
    }

    let (diagnostics, warnings) = diagnose(&chains);
    for warning in &warnings {
        warn!("{}", warning);
    }

    Ok(ModelFit {
        fixed_effects: vec![INTERCEPT.to_string(), COEF_OPPOSITE.to_string()],
        taxa: sub.labels().to_vec(),
        n_obs: dataset.n_obs(),
        params: params.clone(),
        chains,
        diagnostics,
        warnings,
    })
}

fn build_design(dataset: &Dataset, covariance: &CovarianceMatrix, c_inv: DMatrix<f64>) -> FitData {
    let n = dataset.n_obs();
    let q = covariance.len();
    let mut y = DVector::zeros(n);
    let mut x = DMatrix::zeros(n, 2);
    let mut taxon_of = Vec::with_capacity(n);
    let mut counts = vec![0.0f64; q];
    for (i, obs) in dataset.observations().iter().enumerate() {
        y[i] = obs.log10_length;
        x[(i, 0)] = 1.0;
        x[(i, 1)] = if obs.polarity == Polarity::Opposite {
            1.0
        } else {
            0.0
        };
        let t = covariance
            .index_of(&obs.taxon)
            .expect("dataset aligned to covariance");
        taxon_of.push(t);
        counts[t] += 1.0;
    }
    let xtx = x.transpose() * &x;
    FitData {
        y,
        x,
        taxon_of,
        counts,
        c_inv,
        xtx,
    }
}

fn run_chain(seed: u64, data: &FitData, params: &ModelParams) -> ChainDraws {
    let mut chain = GibbsChain::new(seed, data, params);
    for _ in 0..params.warmup {
        chain.step();
    }
    let mut draws = ChainDraws::with_capacity(params.iterations);
    for _ in 0..params.iterations {
        let t = chain.step();
        draws.intercept.push(t.intercept);
        draws.coef_opposite.push(t.coef_opposite);
        draws.sigma_phylo.push(t.sigma_phylo);
        draws.sigma_resid.push(t.sigma_resid);
    }
    draws
}

fn diagnose(chains: &[ChainDraws]) -> (Vec<ParamDiagnostics>, Vec<String>) {
    let mut diagnostics = Vec::with_capacity(PARAM_NAMES.len());
    let mut warnings = Vec::new();
    for name in PARAM_NAMES {
        let series: Vec<&[f64]> = chains
            .iter()
            .filter_map(|c| c.series(name))
            .collect();
        let merged: Vec<f64> = series.iter().flat_map(|s| s.iter().copied()).collect();
        let e = ess(&merged);
        let r = split_rhat(&series);
        if r.is_finite() && r > RHAT_WARN {
            warnings.push(format!("split R-hat for {} is {:.3} (> {})", name, r, RHAT_WARN));
        }
        if e < ESS_WARN {
            warnings.push(format!("effective sample size for {} is {:.0} (< {})", name, e, ESS_WARN));
        }
        diagnostics.push(ParamDiagnostics {
            name: name.to_string(),
            ess: e,
            rhat: r,
        });
    }
    (diagnostics, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tree::PhyloTree;
    use crate::io::table::MeasurementRow;
    use std::io::Write;

    fn small_inputs() -> (Dataset, CovarianceMatrix) {
        let tree = PhyloTree::parse("((A:1,B:1):1,C:2);").unwrap();
        let cov = CovarianceMatrix::from_tree(&tree).unwrap();
        let mut table = String::from("AN\tpolarity_bin\tlog10_length\n");
        for (i, taxon) in ["A", "B", "C"].iter().cycle().take(12).enumerate() {
            let level = if i % 2 == 0 { "same" } else { "opposite" };
            let value = 2.0 + 0.05 * (i as f64) + if i % 2 == 1 { 0.3 } else { 0.0 };
            table.push_str(&format!("{}\t{}\t{:.4}\n", taxon, level, value));
        }
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(table.as_bytes()).unwrap();
        let dataset = Dataset::prepare(file.path(), &cov).unwrap();
        (dataset, cov)
    }

    fn quick_params() -> ModelParams {
        ModelParams {
            chains: 2,
            iterations: 200,
            warmup: 100,
            seed: 42,
            ..ModelParams::default()
        }
    }

    #[test]
    fn fit_produces_expected_shape() {
        let (dataset, cov) = small_inputs();
        let fit = fit(&dataset, &cov, &quick_params()).unwrap();
        assert_eq!(fit.chains.len(), 2);
        assert_eq!(fit.chains[0].coef_opposite.len(), 200);
        assert!(fit.has_fixed_effect(COEF_OPPOSITE));
        assert_eq!(fit.n_taxa(), 3);
        assert_eq!(fit.diagnostics.len(), PARAM_NAMES.len());
    }

    #[test]
    fn identical_seeds_reproduce_draws() {
        let (dataset, cov) = small_inputs();
        let a = fit(&dataset, &cov, &quick_params()).unwrap();
        let b = fit(&dataset, &cov, &quick_params()).unwrap();
        assert_eq!(a.chains[0].coef_opposite, b.chains[0].coef_opposite);
        assert_eq!(a.chains[1].sigma_phylo, b.chains[1].sigma_phylo);
    }

    #[test]
    fn too_few_observations_rejected() {
        let tree = PhyloTree::parse("(A:1,B:1);").unwrap();
        let cov = CovarianceMatrix::from_tree(&tree).unwrap();
        let rows = [
            MeasurementRow {
                taxon: "A".into(),
                log10_length: 2.0,
                polarity: "same".into(),
                line: 2,
            },
            MeasurementRow {
                taxon: "B".into(),
                log10_length: 2.5,
                polarity: "opposite".into(),
                line: 3,
            },
        ];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut text = String::from("AN\tpolarity_bin\tlog10_length\n");
        for r in &rows {
            text.push_str(&format!("{}\t{}\t{}\n", r.taxon, r.polarity, r.log10_length));
        }
        file.write_all(text.as_bytes()).unwrap();
        let dataset = Dataset::prepare(file.path(), &cov).unwrap();
        let err = fit(&dataset, &cov, &quick_params()).unwrap_err();
        assert!(matches!(err, PhyloError::Fit { .. }));
    }

    #[test]
    fn singular_covariance_rejected() {
        // All-zero branch lengths make a valid star covariance but an
        // unusable (singular) random-effect prior.
        let tree = PhyloTree::parse("(A:0,B:0,C:0);").unwrap();
        let cov = CovarianceMatrix::from_tree(&tree).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut text = String::from("AN\tpolarity_bin\tlog10_length\n");
        for i in 0..8 {
            let taxon = ["A", "B", "C"][i % 3];
            let level = if i % 2 == 0 { "same" } else { "opposite" };
            text.push_str(&format!("{}\t{}\t{:.2}\n", taxon, level, 2.0 + i as f64 * 0.1));
        }
        file.write_all(text.as_bytes()).unwrap();
        let dataset = Dataset::prepare(file.path(), &cov).unwrap();
        let err = fit(&dataset, &cov, &quick_params()).unwrap_err();
        assert!(err.to_string().contains("positive definite"), "{}", err);
    }
}
