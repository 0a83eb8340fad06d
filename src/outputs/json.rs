//! JSON output for analysis reports.
//!
//! # Output Structure
//!
//! Reports are grouped by the last day of the analyzed window:
//! ```text
//! output_dir/
//! └── 2025-05-07/
//!     ├── analysis_091500.json
//!     └── analysis_174210.json
//! ```

use crate::analysis::AnalysisReport;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write an [`AnalysisReport`] as pretty-printed JSON.
///
/// # Arguments
///
/// * `report` - The report to serialize
/// * `output_dir` - Base directory for reports
///
/// # Returns
///
/// The path of the written file, or an error if directory creation or file
/// writing fails.
///
/// # Output Path
///
/// The file is written to: `{output_dir}/{window_end}/analysis_{HHMMSS}.json`,
/// where the time is the report's UTC generation time.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_report(report: &AnalysisReport, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let full_dir = output_dir.join(report.window.end().to_string());
    info!(full_dir = %full_dir.display(), "Ensuring report directory exists");
    if let Err(e) = fs::create_dir_all(&full_dir).await {
        error!(full_dir = %full_dir.display(), error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = full_dir.join(format!(
        "analysis_{}.json",
        report.generated_at.format("%H%M%S")
    ));
    fs::write(&path, json).await?;
    info!(path = %path.display(), targets = report.targets.len(), "Wrote analysis report");

    Ok(path)
}
