//! # Group Pipeline
//!
//! Orchestrates the per-group workflow in strict stage order:
//! 1. Validate inputs and output destinations
//! 2. Build the phylogenetic covariance matrix from the tree
//! 3. Prepare and align the dataset
//! 4. Fit the model (parallel chains)
//! 5. Summarize the posterior
//! 6. Write summary, model artifact, and results row
//!
//! Any stage failure aborts the group before a single output byte is
//! written: all artifacts are assembled in memory first and written last, so
//! a failed group never leaves partial files behind.

use std::path::PathBuf;
use std::time::Instant;

use tracing::info;

use crate::data::covariance::CovarianceMatrix;
use crate::data::observations::Dataset;
use crate::error::Result;
use crate::io::output;
use crate::model::parameters::ModelParams;
use crate::model::{self};
use crate::report::posterior::{self, ResultRow};

/// One group's input and output locations.
#[derive(Debug, Clone)]
pub struct GroupPipeline {
    pub group: String,
    pub tree: PathBuf,
    pub table: PathBuf,
    pub out_summary: PathBuf,
    pub out_model: PathBuf,
    pub out_row: PathBuf,
    pub overwrite: bool,
}

impl GroupPipeline {
    /// Run the full pipeline for this group.
    pub fn run(&self, params: &ModelParams) -> Result<ResultRow> {
        let start = Instant::now();
        info!(group = %self.group, "processing group");

        output::check_overwrite(&self.out_summary, self.overwrite)?;
        output::check_overwrite(&self.out_model, self.overwrite)?;

        let covariance = CovarianceMatrix::from_tree_file(&self.tree, params.seed)?;
        info!(taxa = covariance.len(), "covariance matrix built");

        let dataset = Dataset::prepare(&self.table, &covariance)?;
        info!(
            n_obs = dataset.n_obs(),
            n_taxa = dataset.n_taxa(),
            "dataset prepared"
        );

        let fit = model::fit::fit(&dataset, &covariance, params)?;
        info!("model fitted");

        let row = posterior::summarize(&self.group, &fit, &dataset)?;
        let summary = output::render_summary(&self.group, &fit, &dataset, &row);

        // All stages succeeded; only now touch the filesystem.
        output::write_summary(&self.out_summary, &summary)?;
        output::write_model(&self.out_model, &fit)?;
        output::append_result_row(&self.out_row, &row)?;

        info!(
            group = %self.group,
            elapsed_s = format!("{:.2}", start.elapsed().as_secs_f64()),
            "group complete"
        );
        Ok(row)
    }
}
