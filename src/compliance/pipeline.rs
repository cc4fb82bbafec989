//! Scan pipeline
//!
//! Enumerate → evaluate → (remediate) → aggregate, fanned out across
//! subscriptions with a bounded number in flight.

use super::aggregate::{ComplianceReport, ReportAccumulator, ResourceResult};
use super::policy::TagPolicy;
use super::remediation::{plan_remediation, RemediationOutcome, RemediationRules, Remediator, TagWriter};
use crate::azure::client::AzureClient;
use crate::azure::http::format_api_error;
use crate::azure::subscriptions::list_subscription_ids;
use crate::config::Config;
use crate::error::ComplianceError;
use crate::resource::{list_resources, ResourceFilter, ResourceRecord};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use uuid::Uuid;

/// What to scan
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Explicit subscriptions; empty means every enabled subscription
    pub subscriptions: Vec<String>,
    pub filter: ResourceFilter,
}

/// Run a full scan and return the aggregated report
pub async fn run_scan(
    client: &AzureClient,
    config: &Config,
    options: &ScanOptions,
    remediator: &Remediator,
) -> Result<ComplianceReport, ComplianceError> {
    let run_id = Uuid::new_v4();
    let started = Utc::now();

    let subscriptions = resolve_subscriptions(client, options).await?;
    if subscriptions.is_empty() {
        tracing::warn!("No subscriptions in scope, nothing to scan");
        return Ok(ReportAccumulator::new().finish(&config.policy, run_id, started));
    }

    tracing::info!(
        "Scanning {} subscription(s), remediation {}",
        subscriptions.len(),
        if remediator.is_enabled() { "enabled" } else { "dry-run" }
    );

    let concurrency = config.settings.max_concurrent_subscriptions.max(1);
    let accumulator = stream::iter(subscriptions.iter())
        .map(|subscription_id| async move {
            match scan_subscription(client, config, &options.filter, remediator, subscription_id)
                .await
            {
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Subscription {} not scanned: {}", subscription_id, e);
                    Ok(unscanned(subscription_id, &e))
                }
                other => other,
            }
        })
        .buffer_unordered(concurrency)
        .try_fold(ReportAccumulator::new(), |acc, part| async move {
            Ok(acc.merge(part))
        })
        .await?;

    if accumulator.unscanned_count() == subscriptions.len() {
        return Err(ComplianceError::Enumeration(format!(
            "none of the {} subscription(s) could be scanned",
            subscriptions.len()
        )));
    }

    let report = accumulator.finish(&config.policy, run_id, started);
    tracing::info!(
        "Scan complete: {} resources, {}% compliant",
        report.summary.total_resources,
        report.summary.overall_compliance_rate
    );
    Ok(report)
}

async fn resolve_subscriptions(
    client: &AzureClient,
    options: &ScanOptions,
) -> Result<Vec<String>, ComplianceError> {
    if !options.subscriptions.is_empty() {
        return Ok(dedup_subscriptions(&options.subscriptions));
    }

    match list_subscription_ids(client).await {
        Ok(ids) => {
            tracing::info!("Found {} enabled subscription(s)", ids.len());
            Ok(ids)
        }
        Err(e) if e.is_auth_failure() => {
            Err(ComplianceError::Authentication(format_api_error(&e)))
        }
        Err(e) => Err(ComplianceError::Enumeration(format!(
            "failed to list subscriptions: {}",
            format_api_error(&e)
        ))),
    }
}

/// Drop repeated subscription ids, keeping the first occurrence
fn dedup_subscriptions(requested: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = requested
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();

    if unique.len() < requested.len() {
        tracing::warn!(
            "Ignoring {} repeated subscription id(s)",
            requested.len() - unique.len()
        );
    }
    unique
}

/// Accumulator for a subscription whose enumeration failed
fn unscanned(subscription_id: &str, error: &ComplianceError) -> ReportAccumulator {
    let mut acc = ReportAccumulator::new();
    if let Some(failure) = error.to_failure() {
        acc.add_failure(failure);
    }
    acc.mark_unscanned(subscription_id);
    acc
}

/// Scan one subscription into its own accumulator. Authentication failures
/// are fatal; a failed enumeration comes back as `EnumerationPartial`.
async fn scan_subscription(
    client: &AzureClient,
    config: &Config,
    filter: &ResourceFilter,
    remediator: &Remediator,
    subscription_id: &str,
) -> Result<ReportAccumulator, ComplianceError> {
    let mut acc = ReportAccumulator::new();

    let listing = match list_resources(client, subscription_id, filter).await {
        Ok(listing) => listing,
        Err(e) if e.is_auth_failure() => {
            return Err(ComplianceError::Authentication(format!(
                "subscription {}: {}",
                subscription_id,
                format_api_error(&e)
            )));
        }
        Err(e) => {
            return Err(ComplianceError::EnumerationPartial {
                scope: subscription_id.to_string(),
                message: format_api_error(&e),
            });
        }
    };

    for (resource_id, message) in listing.malformed {
        tracing::error!("Cannot evaluate {}: {}", resource_id, message);
        let err = ComplianceError::Evaluation {
            resource_id,
            message,
        };
        if let Some(failure) = err.to_failure() {
            acc.add_errored(failure);
        }
    }

    for record in listing.records {
        let result =
            evaluate_resource(record, &config.policy, &config.remediation, remediator, client).await;

        if let Some(RemediationOutcome::Failed { attempts, error }) = &result.remediation {
            let err = ComplianceError::Remediation {
                resource_id: result.record.id.clone(),
                attempts: *attempts,
                message: error.clone(),
            };
            if let Some(failure) = err.to_failure() {
                acc.add_failure(failure);
            }
        }

        acc.add(&result);
    }

    Ok(acc)
}

/// Evaluate one resource and apply its remediation action, if any
pub async fn evaluate_resource<W: TagWriter>(
    record: ResourceRecord,
    policy: &TagPolicy,
    rules: &RemediationRules,
    remediator: &Remediator,
    writer: &W,
) -> ResourceResult {
    let verdict = policy.evaluate(&record.tags);

    let remediation = match plan_remediation(&record, &verdict, policy, rules) {
        Some(action) => Some(remediator.apply(writer, action).await),
        None => None,
    };

    if !verdict.compliant {
        tracing::debug!(
            "{} non-compliant: missing {:?}, invalid {:?}",
            record.id,
            verdict.missing_tags,
            verdict.invalid_values
        );
    }

    ResourceResult {
        record,
        verdict,
        remediation,
    }
}
