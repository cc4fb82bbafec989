//! Property-based tests using proptest
//!
//! These tests verify the evaluator, the aggregator and the dry-run
//! guarantee using randomized resources.

use aztag::compliance::pipeline::evaluate_resource;
use aztag::compliance::remediation::TagWriter;
use aztag::compliance::{
    ComplianceReport, EmptyValueHandling, RemediationRules, Remediator, ReportAccumulator,
    ResourceResult, TagPolicy, TagRule,
};
use aztag::error::ApiError;
use aztag::resource::ResourceRecord;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

const ENVIRONMENTS: [&str; 3] = ["Dev", "Test", "Prod"];

fn policy() -> TagPolicy {
    TagPolicy::new(
        vec![
            TagRule::required("Environment")
                .with_allowed_values(&ENVIRONMENTS)
                .with_default("Dev"),
            TagRule::required("Owner").with_default("platform"),
            TagRule::required("CostCenter"),
            TagRule::required("Project").optional(),
        ],
        EmptyValueHandling::Missing,
    )
    .unwrap()
}

fn rules() -> RemediationRules {
    serde_json::from_value(serde_json::json!({
        "auto_remediation_enabled": true,
        "rules": [
            { "resource_type": "*", "action": "add_tags", "default_tags": { "ManagedBy": "Automation" } },
            { "resource_type": "Microsoft.Compute/*", "action": "update_tags" }
        ]
    }))
    .unwrap()
}

/// Tag values, including disallowed and empty ones
fn arb_value() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Dev".to_string()),
        Just("Prod".to_string()),
        Just("prod".to_string()),
        Just(String::new()),
        "[A-Za-z0-9]{1,8}",
    ]
}

fn arb_tags() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop_oneof![
            Just("Environment".to_string()),
            Just("environment".to_string()),
            Just("Owner".to_string()),
            Just("CostCenter".to_string()),
            Just("Project".to_string()),
            "[A-Z][a-z]{2,6}",
        ],
        arb_value(),
        0..6,
    )
}

fn arb_record() -> impl Strategy<Value = ResourceRecord> {
    (
        "[a-z][a-z0-9]{0,10}",
        prop_oneof![
            Just("Microsoft.Compute/virtualMachines"),
            Just("Microsoft.Storage/storageAccounts"),
            Just("Microsoft.Web/sites"),
        ],
        prop_oneof![Just("rg-a"), Just("rg-b"), Just("rg-c")],
        arb_tags(),
    )
        .prop_map(|(name, kind, group, tags)| ResourceRecord {
            id: format!("/subscriptions/sub-1/resourceGroups/{}/providers/{}/{}", group, kind, name),
            name,
            resource_type: kind.to_string(),
            location: "westeurope".to_string(),
            tags,
            subscription_id: "sub-1".to_string(),
            resource_group: group.to_string(),
        })
}

/// Resource ids are unique within a scan
fn arb_records() -> impl Strategy<Value = Vec<ResourceRecord>> {
    prop::collection::vec(arb_record(), 0..40).prop_map(|records| {
        records
            .into_iter()
            .enumerate()
            .map(|(i, mut record)| {
                record.id = format!("{}-{}", record.id, i);
                record
            })
            .collect()
    })
}

fn aggregate<'a>(results: impl IntoIterator<Item = &'a ResourceResult>) -> ComplianceReport {
    let mut acc = ReportAccumulator::new();
    for result in results {
        acc.add(result);
    }
    acc.finish(
        &policy(),
        Uuid::nil(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
}

fn results(records: &[ResourceRecord]) -> Vec<ResourceResult> {
    let policy = policy();
    records
        .iter()
        .map(|record| ResourceResult {
            record: record.clone(),
            verdict: policy.evaluate(&record.tags),
            remediation: None,
        })
        .collect()
}

/// Counts every write it is asked to make
#[derive(Default)]
struct CountingWriter {
    writes: AtomicUsize,
}

impl TagWriter for CountingWriter {
    async fn merge_tags(
        &self,
        _resource_id: &str,
        _tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

proptest! {
    /// Every required tag present with an allowed value is compliant
    #[test]
    fn fully_tagged_resource_is_compliant(
        env in prop::sample::select(ENVIRONMENTS.to_vec()),
        owner in "[a-z]{1,8}",
        cost in "[0-9]{1,5}",
        extra in arb_tags(),
    ) {
        let mut tags: BTreeMap<String, String> = extra
            .into_iter()
            .filter(|(k, _)| !["environment", "owner", "costcenter", "project"].contains(&k.to_lowercase().as_str()))
            .collect();
        tags.insert("Environment".into(), env.to_string());
        tags.insert("Owner".into(), owner);
        tags.insert("CostCenter".into(), cost);

        let verdict = policy().evaluate(&tags);
        prop_assert!(verdict.compliant);
        prop_assert!(verdict.missing_tags.is_empty());
        prop_assert!(verdict.invalid_values.is_empty());
    }

    /// A required tag that is absent is always reported missing
    #[test]
    fn absent_required_tag_is_missing(mut tags in arb_tags()) {
        tags.retain(|k, _| !k.eq_ignore_ascii_case("Owner"));
        let verdict = policy().evaluate(&tags);
        prop_assert!(verdict.missing_tags.contains(&"Owner".to_string()));
        prop_assert!(!verdict.compliant);
    }

    /// A tag is never both missing and invalid
    #[test]
    fn missing_and_invalid_are_disjoint(tags in arb_tags()) {
        let verdict = policy().evaluate(&tags);
        for name in &verdict.missing_tags {
            prop_assert!(!verdict.invalid_values.contains(name));
        }
        prop_assert_eq!(
            verdict.compliant,
            verdict.missing_tags.is_empty() && verdict.invalid_values.is_empty()
        );
    }

    /// The report does not depend on the order resources were scanned in
    #[test]
    fn report_is_order_independent(
        (records, shuffled) in arb_records().prop_flat_map(|records| {
            let shuffled = Just(records.clone()).prop_shuffle();
            (Just(records), shuffled)
        })
    ) {
        let forward = aggregate(&results(&records));
        let reordered = aggregate(&results(&shuffled));
        prop_assert_eq!(forward, reordered);
    }

    /// Merging per-subscription accumulators matches a single pass
    #[test]
    fn split_aggregation_matches_single_pass(records in arb_records(), split in 0usize..40) {
        let all = results(&records);
        let split = split.min(all.len());

        let mut left = ReportAccumulator::new();
        let mut right = ReportAccumulator::new();
        for result in &all[..split] {
            left.add(result);
        }
        for result in &all[split..] {
            right.add(result);
        }

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let merged = right.merge(left).finish(&policy(), Uuid::nil(), at);
        prop_assert_eq!(merged, aggregate(&all));
    }

    /// Summary counters are consistent and the rate is a percentage
    #[test]
    fn summary_is_consistent(records in arb_records()) {
        let report = aggregate(&results(&records));
        let s = &report.summary;
        prop_assert_eq!(s.total_resources, records.len() as u64);
        prop_assert_eq!(s.compliant + s.non_compliant, s.total_resources);
        prop_assert_eq!(report.violations.len() as u64, s.non_compliant);
        prop_assert!((0.0..=100.0).contains(&s.overall_compliance_rate));
        for stats in report.tag_statistics.values() {
            prop_assert!((0.0..=100.0).contains(&stats.compliance_rate));
        }
        prop_assert!(report.top_violators.len() <= 10);
    }

    /// With remediation disabled nothing is ever written, and the resource
    /// evaluates exactly as it did before
    #[test]
    fn dry_run_never_writes(records in arb_records()) {
        let writer = CountingWriter::default();
        let remediator = Remediator::new(false, Default::default());
        let policy = policy();
        let rules = rules();

        for record in records {
            let before = record.tags.clone();
            let result = tokio_test::block_on(evaluate_resource(
                record, &policy, &rules, &remediator, &writer,
            ));
            if let Some(outcome) = &result.remediation {
                prop_assert_eq!(outcome.label(), "dry_run");
            }
            prop_assert_eq!(&result.record.tags, &before);
            prop_assert_eq!(&result.verdict, &policy.evaluate(&before));
            prop_assert_eq!(&result.verdict, &policy.evaluate(&result.record.tags));
        }

        prop_assert_eq!(writer.writes.load(Ordering::SeqCst), 0);
    }

    /// Applying the planned tags leaves nothing missing that had a default
    #[test]
    fn applied_tags_fix_what_they_target(record in arb_record()) {
        let writer = CountingWriter::default();
        let remediator = Remediator::new(true, Default::default());
        let policy = policy();

        let result = tokio_test::block_on(evaluate_resource(
            record.clone(), &policy, &rules(), &remediator, &writer,
        ));

        if let Some(aztag::compliance::RemediationOutcome::Applied { tags, .. }) = result.remediation {
            let mut patched = record.tags.clone();
            patched.extend(tags);
            let after = policy.evaluate(&patched);
            prop_assert!(!after.missing_tags.contains(&"Environment".to_string()));
            prop_assert!(!after.missing_tags.contains(&"Owner".to_string()));
            prop_assert_eq!(writer.writes.load(Ordering::SeqCst), 1);
        }
    }

    /// A report survives its own JSON form
    #[test]
    fn report_json_round_trip(records in arb_records()) {
        let report = aggregate(&results(&records));
        let rendered = aztag::report::json::render(&report).unwrap();
        prop_assert_eq!(aztag::report::json::parse(&rendered).unwrap(), report);
    }
}
