//! # Batch Runner
//!
//! Iterates the group pipeline over a root directory with one subdirectory
//! per taxonomic group. Groups are processed sequentially and independently:
//! no priors, data or state are shared across groups, only the results-table
//! append. A missing or broken group is skipped with a warning; the batch
//! continues with the remaining groups.

use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::config::{RESULTS_FILE, TABLE_FILE, TREE_FILE};
use crate::error::{PhyloError, Result};
use crate::model::parameters::ModelParams;
use crate::pipelines::group::GroupPipeline;

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Run the pipeline for the named groups, or for all known groups when the
/// list is empty. Returns an error only if the root itself is unusable.
pub fn run_batch(
    root: &Path,
    groups: &[String],
    params: &ModelParams,
    overwrite: bool,
) -> Result<BatchOutcome> {
    let names = if groups.is_empty() {
        discover_groups(root)?
    } else {
        groups.to_vec()
    };
    if names.is_empty() {
        return Err(PhyloError::input(format!(
            "no groups found under {}",
            root.display()
        )));
    }

    let results_path = root.join(RESULTS_FILE);
    let mut outcome = BatchOutcome::default();

    for name in names {
        let dir = root.join(&name);
        let tree = dir.join(TREE_FILE);
        let table = dir.join(TABLE_FILE);
        if !dir.is_dir() || !tree.is_file() || !table.is_file() {
            warn!(group = %name, "missing directory or inputs, skipping");
            outcome.skipped.push(name);
            continue;
        }
        let pipeline = GroupPipeline {
            group: name.clone(),
            tree,
            table,
            out_summary: dir.join("fit_summary.txt"),
            out_model: dir.join("model.json"),
            out_row: results_path.clone(),
            overwrite,
        };
        match pipeline.run(params) {
            Ok(_) => outcome.completed.push(name),
            Err(e) => {
                error!(group = %name, "group failed: {}", e);
                outcome.failed.push(name);
            }
        }
    }
    Ok(outcome)
}

/// All subdirectories of the root that contain a tree file, sorted.
fn discover_groups(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(TREE_FILE).is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// One group's paths in single-run mode, from explicit CLI arguments.
pub fn single_pipeline(
    tree: PathBuf,
    table: PathBuf,
    out_summary: PathBuf,
    out_model: PathBuf,
    out_row: PathBuf,
    overwrite: bool,
) -> GroupPipeline {
    let group = table
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("group")
        .to_string();
    GroupPipeline {
        group,
        tree,
        table,
        out_summary,
        out_model,
        out_row,
        overwrite,
    }
}
