//! # Posterior Reporting
//!
//! Turns a fitted model plus the raw observations into one flat `ResultRow`:
//! fixed-effect estimate and interval on the log scale, back-transformed
//! level means on the original scale, raw per-level medians as a model-free
//! sanity check, fold-change, probability of direction, and both variance
//! components.

use serde::{Deserialize, Serialize};

use crate::data::observations::{Dataset, Polarity};
use crate::error::{PhyloError, Result};
use crate::model::fit::{ModelFit, COEF_OPPOSITE, INTERCEPT, SIGMA_PHYLO, SIGMA_RESID};
use crate::utils::stats::{central_interval, mean, median};

/// Probability mass of the reported credible intervals.
pub const INTERVAL_PROB: f64 = 0.95;

/// A posterior point estimate with its central credible interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    pub low: f64,
    pub high: f64,
}

impl Estimate {
    fn from_draws(draws: &[f64]) -> Self {
        let (low, high) = central_interval(draws, INTERVAL_PROB);
        Self {
            value: mean(draws),
            low,
            high,
        }
    }

    /// Back-transform from the log scale via exponentiation.
    fn pow_base(self, base: f64) -> Self {
        Self {
            value: base.powf(self.value),
            low: base.powf(self.low),
            high: base.powf(self.high),
        }
    }
}

/// Flat summary record for one group; one row of the shared results table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub group: String,
    pub n_obs: usize,
    pub n_taxa: usize,
    /// Raw per-level medians on the original (linear) scale.
    pub raw_median_same: f64,
    pub raw_median_opposite: f64,
    pub raw_median_diff: f64,
    /// Modeled level means, back-transformed to the original scale.
    pub mean_same: Estimate,
    pub mean_opposite: Estimate,
    /// Opposite-vs-same coefficient on the log scale.
    pub coef_log: Estimate,
    /// Fold-change (opposite / same) on the original scale.
    pub fold_change: Estimate,
    /// Posterior probability that the coefficient exceeds zero.
    pub prob_coef_positive: f64,
    /// Phylogenetic (random-effect) standard deviation, log scale.
    pub sd_phylo: f64,
    /// Residual standard deviation, log scale.
    pub sd_resid: f64,
}

impl ResultRow {
    /// Column names of the shared results table, in output order.
    pub const COLUMNS: [&'static str; 21] = [
        "group",
        "n_obs",
        "n_taxa",
        "raw_median_same",
        "raw_median_opposite",
        "raw_median_diff",
        "mean_same",
        "mean_same_low",
        "mean_same_high",
        "mean_opposite",
        "mean_opposite_low",
        "mean_opposite_high",
        "coef_log",
        "coef_log_low",
        "coef_log_high",
        "fold_change",
        "fold_change_low",
        "fold_change_high",
        "prob_coef_positive",
        "sd_phylo",
        "sd_resid",
    ];

    /// Tab-separated header line.
    pub fn header() -> String {
        Self::COLUMNS.join("\t")
    }

    /// Tab-separated value line matching [`ResultRow::header`].
    pub fn to_tsv(&self) -> String {
        let fields: Vec<String> = vec![
            self.group.clone(),
            self.n_obs.to_string(),
            self.n_taxa.to_string(),
            format_value(self.raw_median_same),
            format_value(self.raw_median_opposite),
            format_value(self.raw_median_diff),
            format_value(self.mean_same.value),
            format_value(self.mean_same.low),
            format_value(self.mean_same.high),
            format_value(self.mean_opposite.value),
            format_value(self.mean_opposite.low),
            format_value(self.mean_opposite.high),
            format_value(self.coef_log.value),
            format_value(self.coef_log.low),
            format_value(self.coef_log.high),
            format_value(self.fold_change.value),
            format_value(self.fold_change.low),
            format_value(self.fold_change.high),
            format_value(self.prob_coef_positive),
            format_value(self.sd_phylo),
            format_value(self.sd_resid),
        ];
        fields.join("\t")
    }
}

fn format_value(v: f64) -> String {
    format!("{:.6}", v)
}

/// Assemble the result row for one group.
///
/// Fails with a report error if the opposite-vs-same coefficient is absent
/// from the fit, which would indicate a wrong baseline encoding.
pub fn summarize(group: &str, fit: &ModelFit, dataset: &Dataset) -> Result<ResultRow> {
    if !fit.has_fixed_effect(COEF_OPPOSITE) {
        return Err(PhyloError::report(format!(
            "coefficient '{}' is absent from the fit; \
             the baseline encoding did not produce the expected contrast",
            COEF_OPPOSITE
        )));
    }
    let coef = draws(fit, COEF_OPPOSITE)?;
    let intercept = draws(fit, INTERCEPT)?;
    let sigma_phylo = draws(fit, SIGMA_PHYLO)?;
    let sigma_resid = draws(fit, SIGMA_RESID)?;
    let base = fit.log_base();

    // Population-level predicted means per level: the random effect is held
    // at its expectation (zero), so `same` is the intercept and `opposite`
    // adds the coefficient, draw by draw.
    let same_log: Vec<f64> = intercept.clone();
    let opposite_log: Vec<f64> = intercept
        .iter()
        .zip(&coef)
        .map(|(b0, b1)| b0 + b1)
        .collect();

    let coef_log = Estimate::from_draws(&coef);
    let mean_same = Estimate::from_draws(&same_log).pow_base(base);
    let mean_opposite = Estimate::from_draws(&opposite_log).pow_base(base);
    let fold_change = coef_log.pow_base(base);

    let positive = coef.iter().filter(|v| **v > 0.0).count();
    let prob_coef_positive = positive as f64 / coef.len() as f64;

    // Model-free check: raw medians on the original scale.
    let raw_same = back_transformed_values(dataset, Polarity::Same, base);
    let raw_opposite = back_transformed_values(dataset, Polarity::Opposite, base);
    let raw_median_same = median(&raw_same);
    let raw_median_opposite = median(&raw_opposite);

    Ok(ResultRow {
        group: group.to_string(),
        n_obs: dataset.n_obs(),
        n_taxa: dataset.n_taxa(),
        raw_median_same,
        raw_median_opposite,
        raw_median_diff: raw_median_opposite - raw_median_same,
        mean_same,
        mean_opposite,
        coef_log,
        fold_change,
        prob_coef_positive,
        sd_phylo: mean(&sigma_phylo),
        sd_resid: mean(&sigma_resid),
    })
}

fn draws(fit: &ModelFit, name: &str) -> Result<Vec<f64>> {
    fit.merged_draws(name).ok_or_else(|| {
        PhyloError::report(format!("posterior draws for '{}' are absent from the fit", name))
    })
}

fn back_transformed_values(dataset: &Dataset, level: Polarity, base: f64) -> Vec<f64> {
    dataset
        .values_for_level(level)
        .into_iter()
        .map(|v| base.powf(v))
        .collect()
}
