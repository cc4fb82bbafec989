//! JSON report

use super::{ensure_dir, OutputFormat, Reporter};
use crate::compliance::aggregate::ComplianceReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "compliance_report_";

pub fn file_name(report: &ComplianceReport) -> String {
    format!("{}{}.json", FILE_PREFIX, report.file_stamp())
}

pub fn render(report: &ComplianceReport) -> serde_json::Result<String> {
    let mut out = serde_json::to_string_pretty(report)?;
    out.push('\n');
    Ok(out)
}

pub fn parse(content: &str) -> serde_json::Result<ComplianceReport> {
    serde_json::from_str(content)
}

pub fn load(path: &Path) -> Result<ComplianceReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse report {}", path.display()))
}

/// Most recent `compliance_report_*.json` in `dir`. The stamp in the file
/// name sorts chronologically.
pub fn find_latest(dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read report directory {}", dir.display()))?;

    let mut latest: Option<(String, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(FILE_PREFIX) || !name.ends_with(".json") {
            continue;
        }
        if latest.as_ref().map_or(true, |(best, _)| name > *best) {
            latest = Some((name, entry.path()));
        }
    }

    latest
        .map(|(_, path)| path)
        .with_context(|| format!("No compliance reports found in {}", dir.display()))
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn write(&self, report: &ComplianceReport, dir: &Path) -> Result<Vec<PathBuf>> {
        ensure_dir(dir)?;
        let path = dir.join(file_name(report));
        std::fs::write(&path, render(report)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(vec![path])
    }
}
