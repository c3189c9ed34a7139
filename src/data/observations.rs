//! # Observations and Dataset Preparation
//!
//! Loads the per-region measurement table, aligns taxon labels against the
//! covariance matrix (fail-fast on any mismatch: a silent subset would
//! invalidate the phylogenetic structure assumption), and encodes polarity as
//! a two-level factor with `same` as the fixed baseline regardless of row
//! order or level frequency.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::covariance::CovarianceMatrix;
use crate::error::{PhyloError, Result};
use crate::io::table::{self, MeasurementRow};

/// Maximum number of offending taxa spelled out in an alignment error.
const MAX_REPORTED_TAXA: usize = 10;

/// Relative orientation of the genes flanking an intergenic region.
///
/// `Same` is always the model baseline; the reported coefficient is
/// "opposite vs same".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Same,
    Opposite,
}

impl Polarity {
    /// Factor levels in fixed order; the first level is the baseline.
    pub const LEVELS: [Polarity; 2] = [Polarity::Same, Polarity::Opposite];

    /// Parse either a binned value (`same`/`opposite`) or a raw strand pair
    /// (`++`/`--` co-oriented, `+-`/`-+` divergent).
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "same" | "++" | "--" => Some(Polarity::Same),
            "opposite" | "+-" | "-+" => Some(Polarity::Opposite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Same => "same",
            Polarity::Opposite => "opposite",
        }
    }
}

/// One intergenic-region measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub taxon: String,
    pub log10_length: f64,
    pub polarity: Polarity,
}

/// A validated, covariance-aligned set of observations.
#[derive(Debug, Clone)]
pub struct Dataset {
    observations: Vec<Observation>,
    /// Distinct taxa with at least one observation, sorted for determinism.
    taxa: Vec<String>,
}

impl Dataset {
    /// Read and validate the measurement table against the covariance index.
    pub fn prepare(table_path: &Path, covariance: &CovarianceMatrix) -> Result<Self> {
        let rows = table::read_measurements(table_path)?;
        if rows.is_empty() {
            return Err(PhyloError::input(format!(
                "table {} contains no measurement rows",
                table_path.display()
            )));
        }
        Self::from_rows(&rows, covariance)
    }

    fn from_rows(rows: &[MeasurementRow], covariance: &CovarianceMatrix) -> Result<Self> {
        let unknown: BTreeSet<&str> = rows
            .iter()
            .filter(|r| !covariance.contains(&r.taxon))
            .map(|r| r.taxon.as_str())
            .collect();
        if !unknown.is_empty() {
            let mut names: Vec<&str> = unknown.iter().copied().take(MAX_REPORTED_TAXA).collect();
            if unknown.len() > names.len() {
                names.push("...");
            }
            return Err(PhyloError::input(format!(
                "{} taxa in the table are absent from the tree: {}",
                unknown.len(),
                names.join(", ")
            )));
        }

        let mut observations = Vec::with_capacity(rows.len());
        for row in rows {
            let polarity = Polarity::parse(&row.polarity).ok_or_else(|| {
                PhyloError::parse(
                    row.line,
                    format!("unknown polarity value '{}'", row.polarity),
                )
            })?;
            observations.push(Observation {
                taxon: row.taxon.clone(),
                log10_length: row.log10_length,
                polarity,
            });
        }

        for level in Polarity::LEVELS {
            if !observations.iter().any(|o| o.polarity == level) {
                return Err(PhyloError::input(format!(
                    "polarity factor has no '{}' observations; both levels are required",
                    level.as_str()
                )));
            }
        }

        let taxa: Vec<String> = observations
            .iter()
            .map(|o| o.taxon.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(Self {
            observations,
            taxa,
        })
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn n_obs(&self) -> usize {
        self.observations.len()
    }

    /// Distinct observed taxa, sorted.
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    pub fn n_taxa(&self) -> usize {
        self.taxa.len()
    }

    /// Number of observations at one polarity level.
    pub fn count_level(&self, level: Polarity) -> usize {
        self.observations
            .iter()
            .filter(|o| o.polarity == level)
            .count()
    }

    /// Log-scale values at one polarity level.
    pub fn values_for_level(&self, level: Polarity) -> Vec<f64> {
        self.observations
            .iter()
            .filter(|o| o.polarity == level)
            .map(|o| o.log10_length)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tree::PhyloTree;
    use std::io::Write;

    fn cov() -> CovarianceMatrix {
        let tree = PhyloTree::parse("((NC_1:1,NC_2:1):1,NC_3:2);").unwrap();
        CovarianceMatrix::from_tree(&tree).unwrap()
    }

    fn prepare(content: &str) -> Result<Dataset> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        Dataset::prepare(file.path(), &cov())
    }

    #[test]
    fn aligns_and_encodes() {
        let ds = prepare(
            "AN\tpolarity_bin\tlog10_length\n\
             NC_1\tsame\t2.0\n\
             NC_2\topposite\t2.5\n\
             NC_1\t+-\t3.0\n",
        )
        .unwrap();
        assert_eq!(ds.n_obs(), 3);
        assert_eq!(ds.n_taxa(), 2);
        assert_eq!(ds.count_level(Polarity::Same), 1);
        assert_eq!(ds.count_level(Polarity::Opposite), 2);
    }

    #[test]
    fn unknown_taxon_fails_batch() {
        let err = prepare(
            "AN\tpolarity_bin\tlog10_length\n\
             NC_1\tsame\t2.0\n\
             NC_9\topposite\t2.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("NC_9"), "{}", err);
    }

    #[test]
    fn single_level_factor_rejected() {
        let err = prepare(
            "AN\tpolarity_bin\tlog10_length\n\
             NC_1\tsame\t2.0\n\
             NC_2\t++\t2.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("opposite"), "{}", err);
    }

    #[test]
    fn baseline_is_first_level_regardless_of_order() {
        assert_eq!(Polarity::LEVELS[0], Polarity::Same);
        let ds = prepare(
            "AN\tpolarity_bin\tlog10_length\n\
             NC_2\topposite\t2.5\n\
             NC_2\topposite\t2.6\n\
             NC_1\tsame\t2.0\n",
        )
        .unwrap();
        // `opposite` is more frequent and appears first; baseline is unchanged.
        assert_eq!(Polarity::LEVELS[0].as_str(), "same");
        assert_eq!(ds.count_level(Polarity::Opposite), 2);
    }

    #[test]
    fn strand_pairs_recode() {
        assert_eq!(Polarity::parse("++"), Some(Polarity::Same));
        assert_eq!(Polarity::parse("--"), Some(Polarity::Same));
        assert_eq!(Polarity::parse("+-"), Some(Polarity::Opposite));
        assert_eq!(Polarity::parse("-+"), Some(Polarity::Opposite));
        assert_eq!(Polarity::parse("??"), None);
    }
}
