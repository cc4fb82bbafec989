//! HTML dashboard
//!
//! A single self-contained page with inline styles. Every value taken from
//! the report goes through [`escape`].

use super::{ensure_dir, OutputFormat, Reporter};
use crate::compliance::aggregate::ComplianceReport;
use anyhow::{Context, Result};
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};

/// Violations listed on the page; the CSV has the full list
const MAX_VIOLATION_ROWS: usize = 100;

const STYLE: &str = "body{font-family:Segoe UI,Arial,sans-serif;margin:2em;color:#222}\
h1{color:#0078d4}\
.cards{display:flex;gap:1em;flex-wrap:wrap}\
.card{border:1px solid #ddd;border-radius:6px;padding:1em 1.5em;min-width:10em}\
.card .value{font-size:1.8em;font-weight:bold}\
.good{color:#107c10}.warning{color:#ff8c00}.danger{color:#d13438}\
table{border-collapse:collapse;margin:1em 0;width:100%}\
th,td{border:1px solid #ddd;padding:.4em .6em;text-align:left}\
th{background:#f3f2f1}\
.bar{background:#eee;height:.8em;width:10em;display:inline-block}\
.bar span{display:block;height:100%;background:#0078d4}";

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn status_class(rate: f64, threshold: f64) -> &'static str {
    if rate >= threshold {
        "good"
    } else if rate >= threshold * 0.75 {
        "warning"
    } else {
        "danger"
    }
}

pub fn file_name(report: &ComplianceReport) -> String {
    format!("compliance_dashboard_{}.html", report.file_stamp())
}

pub fn render(report: &ComplianceReport, threshold: f64) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let s = &report.summary;

    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\"><head><meta charset=\"utf-8\">")?;
    writeln!(out, "<title>Azure Tag Compliance Dashboard</title>")?;
    writeln!(out, "<style>{}</style></head><body>", STYLE)?;
    writeln!(out, "<h1>Azure Tag Compliance Dashboard</h1>")?;
    writeln!(
        out,
        "<p>Scan {} &middot; run {}</p>",
        escape(&report.scan_timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        report.run_id
    )?;

    writeln!(out, "<div class=\"cards\">")?;
    card(
        &mut out,
        "Compliance Rate",
        &format!("{:.2}%", s.overall_compliance_rate),
        Some(status_class(s.overall_compliance_rate, threshold)),
    )?;
    card(&mut out, "Total Resources", &s.total_resources.to_string(), None)?;
    card(&mut out, "Compliant", &s.compliant.to_string(), None)?;
    card(&mut out, "Non-Compliant", &s.non_compliant.to_string(), None)?;
    card(&mut out, "Remediated", &s.remediated.to_string(), None)?;
    card(&mut out, "Errored", &s.errored.to_string(), None)?;
    writeln!(out, "</div>")?;

    if s.overall_compliance_rate < threshold {
        writeln!(
            out,
            "<p class=\"danger\">Below the compliance threshold of {:.2}%</p>",
            threshold
        )?;
    }

    writeln!(out, "<h2>Tag Compliance</h2>")?;
    writeln!(
        out,
        "<table><tr><th>Tag</th><th>Missing</th><th>Invalid</th><th>Compliance Rate</th></tr>"
    )?;
    for (tag, stats) in &report.tag_statistics {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(tag),
            stats.missing_count,
            stats.invalid_count,
            rate_cell(stats.compliance_rate, threshold)
        )?;
    }
    writeln!(out, "</table>")?;

    writeln!(out, "<h2>Resource Types</h2>")?;
    writeln!(
        out,
        "<table><tr><th>Type</th><th>Total</th><th>Compliant</th><th>Non-Compliant</th><th>Compliance Rate</th></tr>"
    )?;
    for (kind, b) in &report.resource_type_breakdown {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(kind),
            b.total,
            b.compliant,
            b.non_compliant,
            rate_cell(b.compliance_rate, threshold)
        )?;
    }
    writeln!(out, "</table>")?;

    if !report.top_violators.is_empty() {
        writeln!(out, "<h2>Top Violating Resource Groups</h2>")?;
        writeln!(out, "<table><tr><th>Resource Group</th><th>Non-Compliant</th></tr>")?;
        for g in &report.top_violators {
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td></tr>",
                escape(&g.resource_group),
                g.non_compliant
            )?;
        }
        writeln!(out, "</table>")?;
    }

    let r = &report.remediation;
    writeln!(out, "<h2>Remediation</h2>")?;
    writeln!(
        out,
        "<table><tr><th>Applied</th><th>Dry-run</th><th>Notified</th><th>Failed</th></tr>\
         <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr></table>",
        r.applied, r.dry_run, r.notified, r.failed
    )?;

    if !report.violations.is_empty() {
        writeln!(out, "<h2>Violations</h2>")?;
        if report.violations.len() > MAX_VIOLATION_ROWS {
            writeln!(
                out,
                "<p>Showing {} of {} violations.</p>",
                MAX_VIOLATION_ROWS,
                report.violations.len()
            )?;
        }
        writeln!(
            out,
            "<table><tr><th>Resource</th><th>Type</th><th>Resource Group</th><th>Missing</th><th>Invalid</th><th>Remediation</th></tr>"
        )?;
        for v in report.violations.iter().take(MAX_VIOLATION_ROWS) {
            let mut remediation = v.remediation.clone().unwrap_or_else(|| "-".to_string());
            if !v.unresolved_tags.is_empty() {
                remediation = format!("{} (unresolved: {})", remediation, v.unresolved_tags.join(", "));
            }
            writeln!(
                out,
                "<tr><td title=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&v.resource_id),
                escape(&v.resource_name),
                escape(&v.resource_type),
                escape(&v.resource_group),
                escape(&v.missing_tags.join(", ")),
                escape(&v.invalid_tags.join(", ")),
                escape(&remediation)
            )?;
        }
        writeln!(out, "</table>")?;
    }

    if !report.failures.is_empty() || !report.unscanned_subscriptions.is_empty() {
        writeln!(out, "<h2>Failures</h2>")?;
        if !report.unscanned_subscriptions.is_empty() {
            writeln!(
                out,
                "<p class=\"warning\">Unscanned subscriptions: {}</p>",
                escape(&report.unscanned_subscriptions.join(", "))
            )?;
        }
        writeln!(out, "<table><tr><th>Kind</th><th>Scope</th><th>Message</th></tr>")?;
        for f in &report.failures {
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                f.kind.as_str(),
                escape(&f.scope),
                escape(&f.message)
            )?;
        }
        writeln!(out, "</table>")?;
    }

    writeln!(out, "</body></html>")?;
    Ok(out)
}

fn card(out: &mut String, label: &str, value: &str, class: Option<&str>) -> fmt::Result {
    writeln!(
        out,
        "<div class=\"card\"><div>{}</div><div class=\"value {}\">{}</div></div>",
        escape(label),
        class.unwrap_or(""),
        escape(value)
    )
}

fn rate_cell(rate: f64, threshold: f64) -> String {
    format!(
        "<span class=\"bar\"><span style=\"width:{:.0}%\"></span></span> <span class=\"{}\">{:.2}%</span>",
        rate.clamp(0.0, 100.0),
        status_class(rate, threshold),
        rate
    )
}

pub struct HtmlReporter {
    threshold: f64,
}

impl HtmlReporter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Reporter for HtmlReporter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Html
    }

    fn write(&self, report: &ComplianceReport, dir: &Path) -> Result<Vec<PathBuf>> {
        ensure_dir(dir)?;
        let path = dir.join(file_name(report));
        let page = render(report, self.threshold)
            .map_err(|_| anyhow::anyhow!("Failed to render HTML dashboard"))?;
        std::fs::write(&path, page).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(vec![path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample_report;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href='x'>&\"</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&quot;&lt;/a&gt;");
    }

    #[test]
    fn resource_names_are_escaped() {
        let page = render(&sample_report(), 80.0).unwrap();
        assert!(page.contains("&lt;sa&gt;"));
        assert!(!page.contains("<sa>"));
    }

    #[test]
    fn shows_threshold_breach_and_failures() {
        let page = render(&sample_report(), 80.0).unwrap();
        assert!(page.contains("33.33%"));
        assert!(page.contains("Below the compliance threshold of 80.00%"));
        assert!(page.contains("Unscanned subscriptions: sub-2"));
        assert!(page.contains("<td>enumeration</td>"));
    }

    #[test]
    fn unresolved_tags_follow_the_remediation_label() {
        let html = render(&sample_report(), 80.0).unwrap();
        assert!(html.contains("<td>dry_run (unresolved: Environment)</td>"));
    }

    #[test]
    fn no_breach_notice_above_threshold() {
        let page = render(&sample_report(), 30.0).unwrap();
        assert!(!page.contains("Below the compliance threshold"));
    }

    #[test]
    fn status_classes() {
        assert_eq!(status_class(90.0, 80.0), "good");
        assert_eq!(status_class(65.0, 80.0), "warning");
        assert_eq!(status_class(10.0, 80.0), "danger");
    }
}
