//! # Phyloreg: Phylogenetic Bayesian Regression
//!
//! Fits a phylogenetic mixed model to intergenic-region measurements.
//!
//! ## Usage
//! ```bash
//! # Single group
//! phyloreg --tree tree.nwk --table filtered.tsv --out-summary fit_summary.txt
//!
//! # All groups under a root directory
//! phyloreg --batch-root runs/
//!
//! # Selected groups only
//! phyloreg --batch-root runs/ fungi_mito plant_plastid
//! ```

use std::time::Instant;

mod config;
mod data;
mod error;
mod io;
mod model;
mod pipelines;
mod report;
mod utils;

use config::Config;
use error::{PhyloError, Result};
use pipelines::batch;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let start = Instant::now();

    let config = Config::parse_and_validate()?;

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .init();

    // One rayon task per chain; never oversubscribe the cores.
    let n_threads = config.nthreads().min(config.chains).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
        .ok();

    eprintln!("phyloreg v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Threads: {}", n_threads);

    let params = config.model_params();

    if config.is_batch_mode() {
        let root = config.batch_root.as_ref().expect("batch mode");
        eprintln!("Mode: Batch");
        eprintln!("Root: {:?}", root);

        let outcome = batch::run_batch(root, &config.groups, &params, config.overwrite)?;
        eprintln!(
            "Groups: {} completed, {} skipped, {} failed",
            outcome.completed.len(),
            outcome.skipped.len(),
            outcome.failed.len()
        );
        if outcome.completed.is_empty() {
            return Err(PhyloError::fit("no group completed successfully"));
        }
    } else {
        let tree = config.tree.clone().expect("validated");
        let table = config.table.clone().expect("validated");
        eprintln!("Mode: Single group");
        eprintln!("Tree: {:?}", tree);
        eprintln!("Table: {:?}", table);

        let pipeline = batch::single_pipeline(
            tree,
            table,
            config.summary_path(),
            config.model_path(),
            config.row_path(),
            config.overwrite,
        );
        pipeline.run(&params)?;
    }

    let elapsed = start.elapsed();
    eprintln!("Completed in {:.2}s", elapsed.as_secs_f64());

    Ok(())
}
