use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use phyloreg::error::PhyloError;
use phyloreg::io::output;
use phyloreg::model::fit::COEF_OPPOSITE;
use phyloreg::model::parameters::ModelParams;
use phyloreg::pipelines::batch::run_batch;
use phyloreg::pipelines::group::GroupPipeline;
use phyloreg::report::posterior::ResultRow;
use tempfile::TempDir;

// --- Helpers ---

/// Builds one group directory (tree.nwk + filtered.tsv) inside a temp root.
struct GroupFixture {
    baseline: f64,
    effect: f64,
    per_taxon: usize,
    header: &'static str,
}

impl GroupFixture {
    fn new() -> Self {
        Self {
            baseline: 2.0,
            effect: 0.3,
            per_taxon: 10,
            header: "AN\tlog10_length\tpolarity_bin",
        }
    }

    fn effect(mut self, effect: f64) -> Self {
        self.effect = effect;
        self
    }

    fn raw_polarity_header(mut self) -> Self {
        self.header = "AN\tlog10_length\tPolarity";
        self
    }

    fn write(&self, dir: &Path) {
        fs::create_dir_all(dir).expect("Create group dir");
        fs::write(dir.join("tree.nwk"), "((A:1.0,B:1.0):1.0,C:2.0);").expect("Write tree");

        let raw = self.header.ends_with("Polarity");
        let mut table = String::new();
        table.push_str(self.header);
        table.push('\n');
        // Balanced design with symmetric, alternating noise so the empirical
        // level difference equals the nominal effect almost exactly.
        for (t, taxon) in ["A", "B", "C"].iter().enumerate() {
            for k in 0..self.per_taxon {
                let opposite = k % 2 == 1;
                let noise = if (k / 2 + t) % 2 == 0 { 0.05 } else { -0.05 };
                let value = self.baseline + if opposite { self.effect } else { 0.0 } + noise;
                let level = match (opposite, raw) {
                    (false, false) => "same",
                    (true, false) => "opposite",
                    (false, true) => "++",
                    (true, true) => "+-",
                };
                table.push_str(&format!("{}\t{:.6}\t{}\n", taxon, value, level));
            }
        }
        fs::write(dir.join("filtered.tsv"), table).expect("Write table");
    }
}

fn pipeline_for(dir: &Path, results: PathBuf) -> GroupPipeline {
    GroupPipeline {
        group: "test_group".to_string(),
        tree: dir.join("tree.nwk"),
        table: dir.join("filtered.tsv"),
        out_summary: dir.join("fit_summary.txt"),
        out_model: dir.join("model.json"),
        out_row: results,
        overwrite: false,
    }
}

fn test_params() -> ModelParams {
    ModelParams {
        chains: 2,
        iterations: 800,
        warmup: 400,
        seed: 7,
        ..ModelParams::default()
    }
}

// --- Tests ---

#[test]
fn end_to_end_recovers_known_effect() {
    let root = TempDir::new().expect("Create temp root");
    let dir = root.path().join("g1");
    GroupFixture::new().write(&dir);

    let pipeline = pipeline_for(&dir, root.path().join("results.tsv"));
    let row = pipeline.run(&test_params()).expect("Pipeline run");

    assert_eq!(row.group, "test_group");
    assert_eq!(row.n_obs, 30);
    assert_eq!(row.n_taxa, 3);

    // The simulated +0.3 log10 effect must sit inside the credible interval.
    assert!(
        row.coef_log.low < 0.3 && 0.3 < row.coef_log.high,
        "interval [{}, {}] misses the simulated effect",
        row.coef_log.low,
        row.coef_log.high
    );
    assert!(row.prob_coef_positive > 0.95);

    // Fold-change is the coefficient back-transformed to the linear scale.
    let expected_fold = 10f64.powf(row.coef_log.value);
    assert!((row.fold_change.value - expected_fold).abs() < 1e-9);
    assert!(row.raw_median_opposite > row.raw_median_same);

    // All three artifacts must exist and be coherent.
    let summary = fs::read_to_string(dir.join("fit_summary.txt")).expect("Read summary");
    assert!(summary.contains(COEF_OPPOSITE));
    assert!(summary.contains("test_group"));

    let reloaded = output::read_model(&dir.join("model.json")).expect("Reload model");
    assert_eq!(reloaded.n_obs, 30);
    assert!(reloaded.has_fixed_effect(COEF_OPPOSITE));

    let results = fs::read_to_string(root.path().join("results.tsv")).expect("Read results");
    let lines: Vec<&str> = results.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], ResultRow::header());
    assert_eq!(lines[1].split('\t').count(), ResultRow::COLUMNS.len());
}

#[test]
fn raw_strand_pairs_are_recoded() {
    let root = TempDir::new().expect("Create temp root");
    let dir = root.path().join("g1");
    GroupFixture::new().raw_polarity_header().write(&dir);

    let pipeline = pipeline_for(&dir, root.path().join("results.tsv"));
    let row = pipeline.run(&test_params()).expect("Pipeline run");
    assert_eq!(row.n_obs, 30);
    assert!(row.prob_coef_positive > 0.95);
}

#[test]
fn unknown_taxa_fail_before_any_output() {
    let root = TempDir::new().expect("Create temp root");
    let dir = root.path().join("g1");
    GroupFixture::new().write(&dir);

    // Append a measurement for a taxon absent from the tree.
    let table = dir.join("filtered.tsv");
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&table)
        .expect("Open table");
    writeln!(file, "Z\t2.100000\tsame").expect("Append row");
    drop(file);

    let pipeline = pipeline_for(&dir, root.path().join("results.tsv"));
    let err = pipeline.run(&test_params()).unwrap_err();
    match err {
        PhyloError::Input { message } => assert!(message.contains('Z'), "{}", message),
        other => panic!("expected Input error, got {}", other),
    }

    assert!(!dir.join("fit_summary.txt").exists());
    assert!(!dir.join("model.json").exists());
    assert!(!root.path().join("results.tsv").exists());
}

#[test]
fn single_level_predictor_is_rejected() {
    let root = TempDir::new().expect("Create temp root");
    let dir = root.path().join("g1");
    fs::create_dir_all(&dir).expect("Create group dir");
    fs::write(dir.join("tree.nwk"), "((A:1.0,B:1.0):1.0,C:2.0);").expect("Write tree");
    let mut table = String::from("AN\tlog10_length\tpolarity_bin\n");
    for taxon in ["A", "B", "C"] {
        for k in 0..4 {
            table.push_str(&format!("{}\t{:.6}\tsame\n", taxon, 2.0 + 0.01 * k as f64));
        }
    }
    fs::write(dir.join("filtered.tsv"), table).expect("Write table");

    let pipeline = pipeline_for(&dir, root.path().join("results.tsv"));
    let err = pipeline.run(&test_params()).unwrap_err();
    assert!(matches!(err, PhyloError::Input { .. }), "got {}", err);
}

#[test]
fn existing_outputs_require_overwrite() {
    let root = TempDir::new().expect("Create temp root");
    let dir = root.path().join("g1");
    GroupFixture::new().write(&dir);

    let mut pipeline = pipeline_for(&dir, root.path().join("results.tsv"));
    pipeline.run(&test_params()).expect("First run");

    let err = pipeline.run(&test_params()).unwrap_err();
    match err {
        PhyloError::Input { message } => assert!(message.contains("--overwrite"), "{}", message),
        other => panic!("expected Input error, got {}", other),
    }

    pipeline.overwrite = true;
    pipeline.run(&test_params()).expect("Overwriting run");
}

#[test]
fn batch_skips_missing_groups_and_appends_rows() {
    let root = TempDir::new().expect("Create temp root");
    GroupFixture::new().write(&root.path().join("g1"));
    GroupFixture::new().effect(-0.2).write(&root.path().join("g3"));

    // g2 has a tree but no table: it must be skipped, not fail the batch.
    let g2 = root.path().join("g2");
    fs::create_dir_all(&g2).expect("Create group dir");
    fs::write(g2.join("tree.nwk"), "((A:1.0,B:1.0):1.0,C:2.0);").expect("Write tree");

    let groups = vec!["g1".to_string(), "g2".to_string(), "g3".to_string()];
    let outcome = run_batch(root.path(), &groups, &test_params(), false).expect("Batch run");
    assert_eq!(outcome.completed, vec!["g1", "g3"]);
    assert_eq!(outcome.skipped, vec!["g2"]);
    assert!(outcome.failed.is_empty());

    let results = fs::read_to_string(root.path().join("results.tsv")).expect("Read results");
    let lines: Vec<&str> = results.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], ResultRow::header());
    assert!(lines[1].starts_with("g1\t"));
    assert!(lines[2].starts_with("g3\t"));
}

#[test]
fn batch_discovers_groups_when_none_are_named() {
    let root = TempDir::new().expect("Create temp root");
    GroupFixture::new().write(&root.path().join("beta"));
    GroupFixture::new().write(&root.path().join("alpha"));

    let outcome = run_batch(root.path(), &[], &test_params(), false).expect("Batch run");
    assert_eq!(outcome.completed, vec!["alpha", "beta"]);
}

#[test]
fn batch_counts_failed_groups_and_continues() {
    let root = TempDir::new().expect("Create temp root");
    GroupFixture::new().write(&root.path().join("good"));

    // One-level predictor makes this group unfittable.
    let bad = root.path().join("bad");
    fs::create_dir_all(&bad).expect("Create group dir");
    fs::write(bad.join("tree.nwk"), "((A:1.0,B:1.0):1.0,C:2.0);").expect("Write tree");
    fs::write(
        bad.join("filtered.tsv"),
        "AN\tlog10_length\tpolarity_bin\nA\t2.0\tsame\nB\t2.1\tsame\nC\t1.9\tsame\nA\t2.05\tsame\n",
    )
    .expect("Write table");

    let outcome = run_batch(root.path(), &[], &test_params(), false).expect("Batch run");
    assert_eq!(outcome.failed, vec!["bad"]);
    assert_eq!(outcome.completed, vec!["good"]);
}
