//! # File I/O
//!
//! Measurement-table reading and the per-group output artifacts.

pub mod output;
pub mod table;
