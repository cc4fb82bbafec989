//! CSV tables
//!
//! One file per table, all sharing the scan stamp:
//! `summary_`, `tag_analysis_`, `resource_types_`, `top_violators_` and
//! `violations_<stamp>.csv`.

use super::{ensure_dir, OutputFormat, Reporter};
use crate::compliance::aggregate::{rate, ComplianceReport};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A rendered table: header plus rows
type Table = (Vec<&'static str>, Vec<Vec<String>>);

fn pct(value: f64) -> String {
    format!("{:.2}", value)
}

pub fn summary_table(report: &ComplianceReport) -> Table {
    let s = &report.summary;
    let mut rows: Vec<Vec<String>> = vec![
        vec!["Total Resources".into(), s.total_resources.to_string(), "Overview".into()],
        vec!["Compliant Resources".into(), s.compliant.to_string(), "Overview".into()],
        vec!["Non-Compliant Resources".into(), s.non_compliant.to_string(), "Overview".into()],
        vec!["Remediated Resources".into(), s.remediated.to_string(), "Overview".into()],
        vec!["Errored Resources".into(), s.errored.to_string(), "Overview".into()],
        vec![
            "Overall Compliance Rate (%)".into(),
            pct(s.overall_compliance_rate),
            "Overview".into(),
        ],
    ];

    for (tag, stats) in &report.tag_statistics {
        let category = format!("Tag: {}", tag);
        rows.push(vec![format!("{} - Missing Count", tag), stats.missing_count.to_string(), category.clone()]);
        rows.push(vec![format!("{} - Invalid Count", tag), stats.invalid_count.to_string(), category.clone()]);
        rows.push(vec![format!("{} - Compliance Rate (%)", tag), pct(stats.compliance_rate), category]);
    }

    (vec!["Metric", "Value", "Category"], rows)
}

/// Per-tag analysis, worst compliance rate first
pub fn tag_analysis_table(report: &ComplianceReport) -> Table {
    let total = report.summary.total_resources;
    let mut stats: Vec<_> = report.tag_statistics.iter().collect();
    stats.sort_by(|(a_name, a), (b_name, b)| {
        a.compliance_rate
            .total_cmp(&b.compliance_rate)
            .then_with(|| a_name.cmp(b_name))
    });

    let rows = stats
        .into_iter()
        .map(|(tag, s)| {
            let violating = s.missing_count + s.invalid_count;
            vec![
                tag.clone(),
                s.missing_count.to_string(),
                s.invalid_count.to_string(),
                pct(s.compliance_rate),
                total.to_string(),
                total.saturating_sub(violating).to_string(),
            ]
        })
        .collect();

    (
        vec![
            "Tag Name",
            "Missing Count",
            "Invalid Count",
            "Compliance Rate (%)",
            "Total Resources",
            "Compliant Resources",
        ],
        rows,
    )
}

pub fn resource_types_table(report: &ComplianceReport) -> Table {
    let rows = report
        .resource_type_breakdown
        .iter()
        .map(|(kind, b)| {
            vec![
                kind.clone(),
                b.compliant.to_string(),
                b.non_compliant.to_string(),
                b.total.to_string(),
                pct(b.compliance_rate),
            ]
        })
        .collect();

    (
        vec!["Resource Type", "Compliant", "Non-Compliant", "Total", "Compliance Rate (%)"],
        rows,
    )
}

pub fn top_violators_table(report: &ComplianceReport) -> Table {
    let total = report.summary.non_compliant;
    let rows = report
        .top_violators
        .iter()
        .map(|g| {
            vec![
                g.resource_group.clone(),
                g.non_compliant.to_string(),
                pct(rate(g.non_compliant, total)),
            ]
        })
        .collect();

    (
        vec!["Resource Group", "Non-Compliant Resources", "Share of Violations (%)"],
        rows,
    )
}

pub fn violations_table(report: &ComplianceReport) -> Table {
    let rows = report
        .violations
        .iter()
        .map(|v| {
            vec![
                v.resource_id.clone(),
                v.resource_name.clone(),
                v.resource_type.clone(),
                v.resource_group.clone(),
                v.subscription_id.clone(),
                v.missing_tags.join(";"),
                v.invalid_tags.join(";"),
                v.remediation.clone().unwrap_or_default(),
                v.unresolved_tags.join(";"),
            ]
        })
        .collect();

    (
        vec![
            "Resource ID",
            "Resource Name",
            "Resource Type",
            "Resource Group",
            "Subscription ID",
            "Missing Tags",
            "Invalid Tags",
            "Remediation",
            "Unresolved Tags",
        ],
        rows,
    )
}

/// Serialize a table to CSV text
pub fn render_table((header, rows): &Table) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

pub struct CsvReporter;

impl CsvReporter {
    fn tables(report: &ComplianceReport) -> [(&'static str, Table); 5] {
        [
            ("summary", summary_table(report)),
            ("tag_analysis", tag_analysis_table(report)),
            ("resource_types", resource_types_table(report)),
            ("top_violators", top_violators_table(report)),
            ("violations", violations_table(report)),
        ]
    }
}

impl Reporter for CsvReporter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Csv
    }

    fn write(&self, report: &ComplianceReport, dir: &Path) -> Result<Vec<PathBuf>> {
        ensure_dir(dir)?;
        let stamp = report.file_stamp();

        let mut written = Vec::new();
        for (name, table) in Self::tables(report) {
            let path = dir.join(format!("{}_{}.csv", name, stamp));
            let content = render_table(&table)?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample_report;

    #[test]
    fn summary_has_overview_and_per_tag_rows() {
        let csv = render_table(&summary_table(&sample_report())).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Metric,Value,Category");
        assert_eq!(lines[1], "Total Resources,3,Overview");
        assert!(lines.contains(&"Overall Compliance Rate (%),33.33,Overview"));
        assert!(lines.contains(&"Owner - Missing Count,1,Tag: Owner"));
        assert!(lines.contains(&"Environment - Invalid Count,1,Tag: Environment"));
    }

    #[test]
    fn tag_analysis_lists_worst_first() {
        let (_, rows) = tag_analysis_table(&sample_report());
        // Environment: 1 missing + 1 invalid; Owner: 1 missing
        assert_eq!(rows[0][0], "Environment");
        assert_eq!(rows[0][3], "33.33");
        assert_eq!(rows[0][5], "1");
        assert_eq!(rows[1][0], "Owner");
    }

    #[test]
    fn violations_join_tag_lists() {
        let csv = render_table(&violations_table(&sample_report())).unwrap();
        assert!(csv.contains("/s/rg-b/<sa>,<sa>,Microsoft.Storage/storageAccounts,rg-b,sub-1,Environment;Owner,,dry_run,Environment"));
        assert!(csv.contains(",,Environment,"));
    }

    #[test]
    fn writes_one_file_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let written = CsvReporter.write(&sample_report(), dir.path()).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "summary_20240501_083000_00000000.csv",
                "tag_analysis_20240501_083000_00000000.csv",
                "resource_types_20240501_083000_00000000.csv",
                "top_violators_20240501_083000_00000000.csv",
                "violations_20240501_083000_00000000.csv",
            ]
        );
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let table: Table = (vec!["a"], vec![vec!["x,y".to_string()]]);
        assert_eq!(render_table(&table).unwrap(), "a\n\"x,y\"\n");
    }
}
