//! Output generation for analysis reports.
//!
//! # Submodules
//!
//! - [`json`]: Writes [`crate::analysis::AnalysisReport`] to dated JSON files
//!
//! Scrape runs produce no files of their own besides the processed-query
//! log and debug snapshots; their summary goes to the log.

pub mod json;
