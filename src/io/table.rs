//! # Measurement Table Reading
//!
//! Tab-separated table parsing with an explicit required-column schema.
//! Unknown columns are ignored; a missing required column is an input error
//! naming the column, and malformed numeric fields are parse errors carrying
//! the line number.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{PhyloError, Result};

/// Column holding the taxon/accession label.
pub const TAXON_COLUMN: &str = "AN";
/// Column holding the log10-scale region length.
pub const VALUE_COLUMN: &str = "log10_length";
/// Column holding the binned polarity; the raw strand-pair column is accepted
/// as a fallback.
pub const POLARITY_COLUMN: &str = "polarity_bin";
/// Raw strand-pair column (`++`, `--`, `+-`, `-+`).
pub const POLARITY_RAW_COLUMN: &str = "Polarity";

/// One parsed table row, with its 1-based source line for error messages.
#[derive(Debug, Clone)]
pub struct MeasurementRow {
    pub taxon: String,
    pub log10_length: f64,
    pub polarity: String,
    pub line: usize,
}

/// Read all measurement rows from a TSV file, validating the schema first.
pub fn read_measurements(path: &Path) -> Result<Vec<MeasurementRow>> {
    if !path.is_file() {
        return Err(PhyloError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| PhyloError::input(format!("table {} is empty", path.display())))?;
    let headers: Vec<&str> = header.split('\t').map(str::trim).collect();

    let taxon_idx = column_index(&headers, TAXON_COLUMN)?;
    let value_idx = column_index(&headers, VALUE_COLUMN)?;
    let polarity_idx = headers
        .iter()
        .position(|h| *h == POLARITY_COLUMN)
        .or_else(|| headers.iter().position(|h| *h == POLARITY_RAW_COLUMN))
        .ok_or_else(|| {
            PhyloError::input(format!(
                "table is missing required column '{}' (or '{}')",
                POLARITY_COLUMN, POLARITY_RAW_COLUMN
            ))
        })?;

    let mut rows = Vec::new();
    for (offset, line) in lines.enumerate() {
        let line_no = offset + 2; // 1-based, after the header
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let needed = taxon_idx.max(value_idx).max(polarity_idx);
        if fields.len() <= needed {
            return Err(PhyloError::parse(
                line_no,
                format!("expected at least {} columns, found {}", needed + 1, fields.len()),
            ));
        }
        let value: f64 = fields[value_idx].trim().parse().map_err(|_| {
            PhyloError::parse(
                line_no,
                format!("invalid {} value '{}'", VALUE_COLUMN, fields[value_idx].trim()),
            )
        })?;
        if !value.is_finite() {
            return Err(PhyloError::parse(
                line_no,
                format!("non-finite {} value", VALUE_COLUMN),
            ));
        }
        rows.push(MeasurementRow {
            taxon: fields[taxon_idx].trim().to_string(),
            log10_length: value,
            polarity: fields[polarity_idx].trim().to_string(),
            line: line_no,
        });
    }
    Ok(rows)
}

fn column_index(headers: &[&str], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| *h == name)
        .ok_or_else(|| PhyloError::input(format!("table is missing required column '{}'", name)))
}
