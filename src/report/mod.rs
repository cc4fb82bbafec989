//! Report output
//!
//! Reporters are pure serializers of a [`ComplianceReport`]: the same report
//! always renders to the same bytes. File names are stamped with the scan
//! time so runs accumulate side by side in the output directory.
//!
//! - [`json`] - the canonical report, also the input of `aztag report` and `aztag notify`
//! - [`csv_export`] - flat CSV tables for spreadsheets
//! - [`html`] - self-contained dashboard
//! - [`history`] - one line per run for trend tracking

pub mod csv_export;
pub mod history;
pub mod html;
pub mod json;

use crate::compliance::aggregate::ComplianceReport;
use crate::error::ComplianceError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use csv_export::CsvReporter;
pub use html::HtmlReporter;
pub use json::JsonReporter;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Html,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
        }
    }
}

/// Serializes a report into one or more files
pub trait Reporter {
    fn format(&self) -> OutputFormat;

    /// Write the report into `dir`, returning the files created
    fn write(&self, report: &ComplianceReport, dir: &Path) -> anyhow::Result<Vec<PathBuf>>;
}

/// Build the reporters for the requested formats
pub fn reporters_for(formats: &[OutputFormat], compliance_threshold: f64) -> Vec<Box<dyn Reporter>> {
    let mut formats = formats.to_vec();
    formats.sort();
    formats.dedup();

    formats
        .into_iter()
        .map(|format| -> Box<dyn Reporter> {
            match format {
                OutputFormat::Json => Box::new(JsonReporter),
                OutputFormat::Csv => Box::new(CsvReporter),
                OutputFormat::Html => Box::new(HtmlReporter::new(compliance_threshold)),
            }
        })
        .collect()
}

/// Write every requested format. A failing format is recorded in the
/// report's failures and does not stop the others. JSON is written last so
/// it carries the failures of the other formats.
pub fn write_reports(
    report: &mut ComplianceReport,
    reporters: &[Box<dyn Reporter>],
    dir: &Path,
) -> Vec<PathBuf> {
    let mut written = Vec::new();

    let mut ordered: Vec<&dyn Reporter> = reporters.iter().map(|r| r.as_ref()).collect();
    ordered.sort_by_key(|r| r.format() == OutputFormat::Json);

    for reporter in ordered {
        let format = reporter.format();
        match reporter.write(report, dir) {
            Ok(paths) => {
                for path in &paths {
                    tracing::info!("{} report saved: {}", format.as_str(), path.display());
                }
                written.extend(paths);
            }
            Err(e) => {
                let err = ComplianceError::ReportWrite {
                    format: format.as_str().to_string(),
                    path: dir.to_path_buf(),
                    message: format!("{:#}", e),
                };
                tracing::error!("{}", err);
                if let Some(failure) = err.to_failure() {
                    report.failures.push(failure);
                }
            }
        }
    }

    written
}

/// Console summary printed at the end of a scan
pub fn summary_table(report: &ComplianceReport) -> String {
    let s = &report.summary;
    let rows = [
        ("Total Resources Scanned", s.total_resources.to_string()),
        ("Compliant Resources", s.compliant.to_string()),
        ("Non-Compliant Resources", s.non_compliant.to_string()),
        ("Remediated Resources", s.remediated.to_string()),
        ("Would Remediate (dry-run)", report.remediation.dry_run.to_string()),
        ("Errored Resources", s.errored.to_string()),
        ("Unscanned Subscriptions", report.unscanned_subscriptions.len().to_string()),
        ("Overall Compliance Rate", format!("{:.2}%", s.overall_compliance_rate)),
    ];

    let label_width = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let value_width = rows.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let rule = format!("+-{}-+-{}-+", "-".repeat(label_width), "-".repeat(value_width));

    let mut out = String::new();
    out.push_str("Compliance Summary\n");
    out.push_str(&rule);
    out.push('\n');
    for (label, value) in rows {
        out.push_str(&format!(
            "| {:<lw$} | {:>vw$} |\n",
            label,
            value,
            lw = label_width,
            vw = value_width
        ));
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

pub(crate) fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    use anyhow::Context;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::compliance::aggregate::{ComplianceReport, ReportAccumulator, ResourceResult};
    use crate::compliance::policy::{EmptyValueHandling, TagPolicy, TagRule};
    use crate::compliance::remediation::RemediationOutcome;
    use crate::error::{FailureKind, FailureRecord};
    use crate::resource::ResourceRecord;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn record(id: &str, kind: &str, group: &str, tags: &[(&str, &str)]) -> ResourceRecord {
        ResourceRecord {
            id: id.into(),
            name: id.rsplit('/').next().unwrap_or(id).into(),
            resource_type: kind.into(),
            location: "westeurope".into(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            subscription_id: "sub-1".into(),
            resource_group: group.into(),
        }
    }

    /// Small report with one of everything
    pub fn sample_report() -> ComplianceReport {
        let policy = TagPolicy::new(
            vec![
                TagRule::required("Environment").with_allowed_values(&["Dev", "Prod"]),
                TagRule::required("Owner"),
            ],
            EmptyValueHandling::Missing,
        )
        .unwrap();

        let mut acc = ReportAccumulator::new();
        let resources = [
            record("/s/rg-a/vm1", "Microsoft.Compute/virtualMachines", "rg-a", &[
                ("Environment", "Prod"),
                ("Owner", "ops"),
            ]),
            record("/s/rg-a/vm2", "Microsoft.Compute/virtualMachines", "rg-a", &[
                ("Environment", "Stage"),
                ("Owner", "ops"),
            ]),
            record("/s/rg-b/<sa>", "Microsoft.Storage/storageAccounts", "rg-b", &[]),
        ];

        for (i, record) in resources.into_iter().enumerate() {
            let verdict = policy.evaluate(&record.tags);
            let remediation = (i == 2).then(|| RemediationOutcome::DryRun {
                tags: BTreeMap::from([("Owner".to_string(), "unknown".to_string())]),
                unresolved: vec!["Environment".to_string()],
            });
            acc.add(&ResourceResult {
                record,
                verdict,
                remediation,
            });
        }

        acc.add_failure(FailureRecord {
            kind: FailureKind::Enumeration,
            scope: "sub-2".into(),
            message: "failed to enumerate sub-2: Permission denied.".into(),
        });
        acc.mark_unscanned("sub-2");

        acc.finish(
            &policy,
            Uuid::nil(),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        )
    }
}
