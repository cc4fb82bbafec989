//! Compliance history, one CSV line per run

use crate::compliance::aggregate::ComplianceReport;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const HISTORY_FILE: &str = "compliance_history.csv";

const HEADER: [&str; 9] = [
    "scan_timestamp",
    "run_id",
    "total_resources",
    "compliant",
    "non_compliant",
    "remediated",
    "errored",
    "unscanned_subscriptions",
    "overall_compliance_rate",
];

fn row(report: &ComplianceReport) -> [String; 9] {
    let s = &report.summary;
    [
        report.scan_timestamp.to_rfc3339(),
        report.run_id.to_string(),
        s.total_resources.to_string(),
        s.compliant.to_string(),
        s.non_compliant.to_string(),
        s.remediated.to_string(),
        s.errored.to_string(),
        report.unscanned_subscriptions.len().to_string(),
        format!("{:.2}", s.overall_compliance_rate),
    ]
}

/// Append this run to `<dir>/compliance_history.csv`, writing the header
/// when the file is new
pub fn append_history(report: &ComplianceReport, dir: &Path) -> Result<PathBuf> {
    super::ensure_dir(dir)?;
    let path = dir.join(HISTORY_FILE);
    let is_new = !path.exists();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(HEADER)?;
    }
    writer.write_record(row(report))?;
    writer.flush()?;

    tracing::debug!("Appended run {} to {}", report.run_id, path.display());
    Ok(path)
}
