//! # Configuration Logic
//!
//! CLI argument parsing and validation via `clap` derive.
//!
//! Two modes share one flag set:
//! - **Single-group**: `--tree` + `--table` (+ output paths) fit one model.
//! - **Batch**: `--batch-root DIR [GROUP...]` iterates over group
//!   subdirectories, each holding a `tree.nwk` and a `filtered.tsv`. Zero
//!   group names means "all known groups".

use std::path::PathBuf;

use clap::Parser;

use crate::error::{PhyloError, Result};
use crate::model::parameters::ModelParams;

/// File name of the per-group tree inside a batch directory.
pub const TREE_FILE: &str = "tree.nwk";
/// File name of the per-group measurement table inside a batch directory.
pub const TABLE_FILE: &str = "filtered.tsv";
/// File name of the shared results table at the batch root.
pub const RESULTS_FILE: &str = "results.tsv";

/// Phylogenetic Bayesian regression for intergenic-region lengths.
#[derive(Parser, Debug, Clone)]
#[command(name = "phyloreg", version, about)]
pub struct Config {
    /// Phylogenetic tree in Newick format (single-group mode)
    #[arg(long)]
    pub tree: Option<PathBuf>,

    /// Tab-separated measurement table (single-group mode)
    #[arg(long)]
    pub table: Option<PathBuf>,

    /// Output path for the human-readable fit summary
    #[arg(long)]
    pub out_summary: Option<PathBuf>,

    /// Output path for the serialized model artifact
    #[arg(long)]
    pub out_model: Option<PathBuf>,

    /// Output path for the one-row results table
    #[arg(long)]
    pub out_row: Option<PathBuf>,

    /// Root directory containing one subdirectory per group (batch mode)
    #[arg(long)]
    pub batch_root: Option<PathBuf>,

    /// Group names to process in batch mode; empty means all known groups
    #[arg()]
    pub groups: Vec<String>,

    /// Number of independent MCMC chains
    #[arg(long, default_value_t = 4)]
    pub chains: usize,

    /// Post-warmup draws per chain
    #[arg(long, default_value_t = 2000)]
    pub iterations: usize,

    /// Warmup (burn-in) iterations per chain, discarded
    #[arg(long, default_value_t = 1000)]
    pub warmup: usize,

    /// Random seed controlling polytomy resolution and chain initialization
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of worker threads (default: all physical cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Overwrite existing output files
    #[arg(long)]
    pub overwrite: bool,

    /// Enable verbose (debug-level) logging
    #[arg(long)]
    pub verbose: bool,
}

impl Config {
    /// Parse CLI arguments and validate cross-field constraints.
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate mode selection, sampler settings and input file existence.
    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            return Err(PhyloError::config("--chains must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(PhyloError::config("--iterations must be positive"));
        }

        if self.is_batch_mode() {
            if self.tree.is_some() || self.table.is_some() {
                return Err(PhyloError::config(
                    "--batch-root cannot be combined with --tree/--table",
                ));
            }
            let root = self.batch_root.as_ref().expect("batch mode");
            if !root.is_dir() {
                return Err(PhyloError::config(format!(
                    "batch root {} is not a directory",
                    root.display()
                )));
            }
            return Ok(());
        }

        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| PhyloError::config("--tree is required (or use --batch-root)"))?;
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| PhyloError::config("--table is required (or use --batch-root)"))?;
        for path in [tree, table] {
            if !path.is_file() {
                return Err(PhyloError::FileNotFound { path: path.clone() });
            }
        }
        if !self.groups.is_empty() {
            return Err(PhyloError::config(
                "group names are only accepted in batch mode",
            ));
        }
        Ok(())
    }

    /// Whether the batch runner drives execution.
    pub fn is_batch_mode(&self) -> bool {
        self.batch_root.is_some()
    }

    /// Resolved thread count: explicit `--threads` or all available cores.
    pub fn nthreads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Sampler settings derived from the CLI flags.
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            chains: self.chains,
            iterations: self.iterations,
            warmup: self.warmup,
            seed: self.seed,
            ..ModelParams::default()
        }
    }

    /// Output path for the fit summary in single-group mode.
    ///
    /// Defaults to `fit_summary.txt` next to the measurement table.
    pub fn summary_path(&self) -> PathBuf {
        self.out_summary
            .clone()
            .unwrap_or_else(|| self.sibling_of_table("fit_summary.txt"))
    }

    /// Output path for the model artifact in single-group mode.
    pub fn model_path(&self) -> PathBuf {
        self.out_model
            .clone()
            .unwrap_or_else(|| self.sibling_of_table("model.json"))
    }

    /// Output path for the one-row results table in single-group mode.
    pub fn row_path(&self) -> PathBuf {
        self.out_row
            .clone()
            .unwrap_or_else(|| self.sibling_of_table("results_row.tsv"))
    }

    fn sibling_of_table(&self, name: &str) -> PathBuf {
        let table = self.table.as_deref().expect("single-group mode");
        table.parent().unwrap_or_else(|| std::path::Path::new(".")).join(name)
    }
}
