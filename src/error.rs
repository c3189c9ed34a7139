//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! Every failure is fatal for the group being processed: the batch runner
//! catches errors at group granularity and moves on to the next group.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for phyloreg operations
#[derive(Error, Debug)]
pub enum PhyloError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input errors (missing/malformed tree or table, unresolvable taxon
    /// mismatch, single-level predictor)
    #[error("Input error: {message}")]
    Input { message: String },

    /// Fit errors (insufficient data for the random-effect structure,
    /// degenerate chains, non-positive-definite covariance)
    #[error("Fit error: {message}")]
    Fit { message: String },

    /// Report errors (expected posterior quantity absent from the fit)
    #[error("Report error: {message}")]
    Report { message: String },

    /// Parse errors with source location
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Configuration errors (invalid CLI arguments)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },
}

/// Type alias for Results using PhyloError
pub type Result<T> = std::result::Result<T, PhyloError>;

impl PhyloError {
    /// Create an input error with a message
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Create a fit error
    pub fn fit(message: impl Into<String>) -> Self {
        Self::Fit {
            message: message.into(),
        }
    }

    /// Create a report error
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
