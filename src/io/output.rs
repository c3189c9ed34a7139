//! # Output Writing
//!
//! The three per-group artifacts: a human-readable fit summary, a shared
//! tab-separated results table, and a JSON model artifact. Summary and model
//! files are written to a sibling temp file and renamed into place, so a
//! failure mid-write never leaves a partial artifact; the results row is
//! appended only after the whole group has succeeded.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::data::observations::{Dataset, Polarity};
use crate::error::{PhyloError, Result};
use crate::model::fit::ModelFit;
use crate::report::posterior::ResultRow;

/// Refuse to clobber an existing output unless overwriting was requested.
pub fn check_overwrite(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(PhyloError::input(format!(
            "output file {} already exists (use --overwrite)",
            path.display()
        )));
    }
    Ok(())
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize the model artifact (opaque, reloadable JSON).
pub fn write_model(path: &Path, fit: &ModelFit) -> Result<()> {
    let json = serde_json::to_vec_pretty(fit)
        .map_err(|e| PhyloError::report(format!("failed to serialize model: {}", e)))?;
    write_atomic(path, &json)
}

/// Reload a serialized model artifact.
pub fn read_model(path: &Path) -> Result<ModelFit> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| PhyloError::input(format!("failed to deserialize model {}: {}", path.display(), e)))
}

/// Write the human-readable fit summary.
pub fn write_summary(path: &Path, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

/// Append one row to a results table, creating it with a header when absent.
pub fn append_result_row(path: &Path, row: &ResultRow) -> Result<()> {
    let needs_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        writeln!(file, "{}", ResultRow::header())?;
    }
    writeln!(file, "{}", row.to_tsv())?;
    Ok(())
}

/// Render the fit summary: factor levels with the baseline, data counts, a
/// parameter table with convergence context, and the formatted delta/fold
/// strings for the results table.
pub fn render_summary(group: &str, fit: &ModelFit, dataset: &Dataset, row: &ResultRow) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Phylogenetic regression summary: {}\n\n", group));

    out.push_str(&format!(
        "Observations: {}\nTaxa: {}\n",
        row.n_obs, row.n_taxa
    ));
    out.push_str(&format!(
        "Polarity levels: {} (baseline), {}\n",
        Polarity::LEVELS[0].as_str(),
        Polarity::LEVELS[1].as_str()
    ));
    out.push_str(&format!(
        "Per level: same = {}, opposite = {}\n\n",
        dataset.count_level(Polarity::Same),
        dataset.count_level(Polarity::Opposite)
    ));

    out.push_str(&format!(
        "Model: log10_length ~ polarity + (1 | taxon; tree covariance)\n\
         Chains: {}  Draws/chain: {}  Warmup: {}  Seed: {}\n\n",
        fit.params.chains, fit.params.iterations, fit.params.warmup, fit.params.seed
    ));

    out.push_str("Parameter            Estimate      2.5%     97.5%       ESS      Rhat\n");
    // Fixed effects: estimate and interval on the log scale. The intercept's
    // interval is not part of the results row; it is recovered from the
    // back-transformed baseline level mean.
    let base = fit.log_base();
    out.push_str(&param_line(
        "Intercept",
        log_with_base(row.mean_same.value, base),
        log_with_base(row.mean_same.low, base),
        log_with_base(row.mean_same.high, base),
        fit,
    ));
    out.push_str(&param_line(
        "polarity_opposite",
        row.coef_log.value,
        row.coef_log.low,
        row.coef_log.high,
        fit,
    ));
    out.push_str(&format!(
        "{:<20} {:>9.4}\n{:<20} {:>9.4}\n\n",
        "sigma_phylo", row.sd_phylo, "sigma_resid", row.sd_resid
    ));

    out.push_str(&format!(
        "Raw medians (original scale): same = {:.1}, opposite = {:.1}, delta = {:+.1}\n",
        row.raw_median_same, row.raw_median_opposite, row.raw_median_diff
    ));
    out.push_str(&format!(
        "Modeled means (original scale): same = {:.1} [{:.1}, {:.1}], opposite = {:.1} [{:.1}, {:.1}]\n",
        row.mean_same.value,
        row.mean_same.low,
        row.mean_same.high,
        row.mean_opposite.value,
        row.mean_opposite.low,
        row.mean_opposite.high
    ));
    out.push_str(&format!(
        "Fold change (opposite / same): {:.3} [{:.3}, {:.3}]\n",
        row.fold_change.value, row.fold_change.low, row.fold_change.high
    ));
    out.push_str(&format!(
        "P(coefficient > 0) = {:.4}\n",
        row.prob_coef_positive
    ));

    if !fit.warnings.is_empty() {
        out.push('\n');
        for warning in &fit.warnings {
            out.push_str(&format!("WARNING: {}\n", warning));
        }
    }
    out
}

fn param_line(name: &str, est: f64, low: f64, high: f64, fit: &ModelFit) -> String {
    let diag = fit.diagnostics.iter().find(|d| d.name == name);
    let (ess, rhat) = diag.map(|d| (d.ess, d.rhat)).unwrap_or((f64::NAN, f64::NAN));
    format!(
        "{:<20} {:>9.4} {:>9.4} {:>9.4} {:>9.0} {:>9.3}\n",
        name, est, low, high, ess, rhat
    )
}

fn log_with_base(value: f64, base: f64) -> f64 {
    value.ln() / base.ln()
}
