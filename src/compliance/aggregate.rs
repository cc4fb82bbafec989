//! Report aggregation
//!
//! [`ReportAccumulator`] only holds counters and sets, so `merge` is
//! associative and commutative: subscriptions can be aggregated separately
//! and combined in any order. [`ReportAccumulator::finish`] sorts every list,
//! which makes the report independent of scan order.

use super::policy::{ComplianceVerdict, TagPolicy};
use super::remediation::RemediationOutcome;
use crate::error::FailureRecord;
use crate::resource::ResourceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Number of resource groups listed under `top_violators`
pub const TOP_VIOLATORS: usize = 10;

/// One evaluated resource; the unit fed to the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResult {
    pub record: ResourceRecord,
    pub verdict: ComplianceVerdict,
    pub remediation: Option<RemediationOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Counts {
    total: u64,
    compliant: u64,
}

impl Counts {
    fn add(&mut self, compliant: bool) {
        self.total += 1;
        if compliant {
            self.compliant += 1;
        }
    }

    fn merge(&mut self, other: &Counts) {
        self.total += other.total;
        self.compliant += other.compliant;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportAccumulator {
    overall: Counts,
    errored: u64,
    tag_missing: BTreeMap<String, u64>,
    tag_invalid: BTreeMap<String, u64>,
    by_type: BTreeMap<String, Counts>,
    violations_by_group: BTreeMap<String, u64>,
    remediation: RemediationCounts,
    violations: BTreeSet<Violation>,
    failures: BTreeSet<FailureRecord>,
    unscanned: BTreeSet<String>,
}

impl ReportAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: &ResourceResult) {
        let verdict = &result.verdict;
        let record = &result.record;

        self.overall.add(verdict.compliant);
        self.by_type
            .entry(record.resource_type.clone())
            .or_default()
            .add(verdict.compliant);

        for tag in &verdict.missing_tags {
            *self.tag_missing.entry(tag.clone()).or_default() += 1;
        }
        for tag in &verdict.invalid_values {
            *self.tag_invalid.entry(tag.clone()).or_default() += 1;
        }

        if let Some(outcome) = &result.remediation {
            self.remediation.record(outcome);
        }

        if !verdict.compliant {
            *self
                .violations_by_group
                .entry(record.resource_group.clone())
                .or_default() += 1;
            self.violations.insert(Violation::new(result));
        }
    }

    /// Count a resource that could not be evaluated
    pub fn add_errored(&mut self, failure: FailureRecord) {
        self.errored += 1;
        self.failures.insert(failure);
    }

    pub fn add_failure(&mut self, failure: FailureRecord) {
        self.failures.insert(failure);
    }

    pub fn mark_unscanned(&mut self, subscription_id: &str) {
        self.unscanned.insert(subscription_id.to_string());
    }

    pub fn unscanned_count(&self) -> usize {
        self.unscanned.len()
    }

    pub fn merge(mut self, other: ReportAccumulator) -> Self {
        self.overall.merge(&other.overall);
        self.errored += other.errored;
        merge_counters(&mut self.tag_missing, other.tag_missing);
        merge_counters(&mut self.tag_invalid, other.tag_invalid);
        for (kind, counts) in other.by_type {
            self.by_type.entry(kind).or_default().merge(&counts);
        }
        merge_counters(&mut self.violations_by_group, other.violations_by_group);
        self.remediation.merge(&other.remediation);
        self.violations.extend(other.violations);
        self.failures.extend(other.failures);
        self.unscanned.extend(other.unscanned);
        self
    }

    /// Produce the final report. Every rule in the policy gets a tag entry,
    /// even when no resource violated it.
    pub fn finish(self, policy: &TagPolicy, run_id: Uuid, scan_timestamp: DateTime<Utc>) -> ComplianceReport {
        let total = self.overall.total;

        let mut tag_names: BTreeSet<String> = policy.tags.iter().map(|r| r.name.clone()).collect();
        tag_names.extend(self.tag_missing.keys().cloned());
        tag_names.extend(self.tag_invalid.keys().cloned());

        let tag_statistics = tag_names
            .into_iter()
            .map(|name| {
                let missing = self.tag_missing.get(&name).copied().unwrap_or(0);
                let invalid = self.tag_invalid.get(&name).copied().unwrap_or(0);
                let stats = TagStatistics {
                    missing_count: missing,
                    invalid_count: invalid,
                    compliance_rate: rate(total.saturating_sub(missing + invalid), total),
                };
                (name, stats)
            })
            .collect();

        let resource_type_breakdown = self
            .by_type
            .into_iter()
            .map(|(kind, counts)| {
                let breakdown = TypeBreakdown {
                    total: counts.total,
                    compliant: counts.compliant,
                    non_compliant: counts.total - counts.compliant,
                    compliance_rate: rate(counts.compliant, counts.total),
                };
                (kind, breakdown)
            })
            .collect();

        let mut top_violators: Vec<GroupViolations> = self
            .violations_by_group
            .into_iter()
            .map(|(resource_group, non_compliant)| GroupViolations {
                resource_group,
                non_compliant,
            })
            .collect();
        top_violators.sort_by(|a, b| {
            b.non_compliant
                .cmp(&a.non_compliant)
                .then_with(|| a.resource_group.cmp(&b.resource_group))
        });
        top_violators.truncate(TOP_VIOLATORS);

        ComplianceReport {
            run_id,
            scan_timestamp,
            summary: Summary {
                total_resources: total,
                compliant: self.overall.compliant,
                non_compliant: total - self.overall.compliant,
                remediated: self.remediation.applied,
                errored: self.errored,
                overall_compliance_rate: rate(self.overall.compliant, total),
            },
            tag_statistics,
            resource_type_breakdown,
            top_violators,
            remediation: self.remediation,
            violations: self.violations.into_iter().collect(),
            failures: self.failures.into_iter().collect(),
            unscanned_subscriptions: self.unscanned.into_iter().collect(),
        }
    }
}

fn merge_counters(into: &mut BTreeMap<String, u64>, from: BTreeMap<String, u64>) {
    for (key, count) in from {
        *into.entry(key).or_default() += count;
    }
}

/// Percentage rounded to two decimals; 0.0 when there is nothing to count
pub fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = part as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Aggregate of one run, written to every output format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub run_id: Uuid,
    pub scan_timestamp: DateTime<Utc>,
    pub summary: Summary,
    pub tag_statistics: BTreeMap<String, TagStatistics>,
    pub resource_type_breakdown: BTreeMap<String, TypeBreakdown>,
    pub top_violators: Vec<GroupViolations>,
    pub remediation: RemediationCounts,
    pub violations: Vec<Violation>,
    pub failures: Vec<FailureRecord>,
    pub unscanned_subscriptions: Vec<String>,
}

impl ComplianceReport {
    /// File name stamp: scan time, then the first 8 hex digits of the run id
    /// so runs started in the same second do not overwrite each other
    pub fn file_stamp(&self) -> String {
        let run = self.run_id.simple().to_string();
        format!("{}_{}", self.scan_timestamp.format("%Y%m%d_%H%M%S"), &run[..8])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_resources: u64,
    pub compliant: u64,
    pub non_compliant: u64,
    pub remediated: u64,
    pub errored: u64,
    pub overall_compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagStatistics {
    pub missing_count: u64,
    pub invalid_count: u64,
    pub compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub total: u64,
    pub compliant: u64,
    pub non_compliant: u64,
    pub compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupViolations {
    pub resource_group: String,
    pub non_compliant: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationCounts {
    pub applied: u64,
    pub dry_run: u64,
    pub notified: u64,
    pub failed: u64,
}

impl RemediationCounts {
    fn record(&mut self, outcome: &RemediationOutcome) {
        match outcome {
            RemediationOutcome::Applied { .. } => self.applied += 1,
            RemediationOutcome::DryRun { .. } => self.dry_run += 1,
            RemediationOutcome::Notified => self.notified += 1,
            RemediationOutcome::Failed { .. } => self.failed += 1,
        }
    }

    fn merge(&mut self, other: &RemediationCounts) {
        self.applied += other.applied;
        self.dry_run += other.dry_run;
        self.notified += other.notified;
        self.failed += other.failed;
    }
}

/// A non-compliant resource as listed in the report
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Violation {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_type: String,
    pub resource_group: String,
    pub subscription_id: String,
    pub missing_tags: Vec<String>,
    pub invalid_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Tags the remediation could not fix
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_tags: Vec<String>,
}

impl Violation {
    fn new(result: &ResourceResult) -> Self {
        Self {
            resource_id: result.record.id.clone(),
            resource_name: result.record.name.clone(),
            resource_type: result.record.resource_type.clone(),
            resource_group: result.record.resource_group.clone(),
            subscription_id: result.record.subscription_id.clone(),
            missing_tags: result.verdict.missing_tags.clone(),
            invalid_tags: result.verdict.invalid_values.clone(),
            remediation: result.remediation.as_ref().map(|o| o.label().to_string()),
            unresolved_tags: result
                .remediation
                .as_ref()
                .map(|o| o.unresolved().to_vec())
                .unwrap_or_default(),
        }
    }
}
