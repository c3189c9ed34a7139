//! # Reporting Layer
//!
//! Posterior extraction and the flat per-group result record.

pub mod posterior;

pub use posterior::{summarize, Estimate, ResultRow};
