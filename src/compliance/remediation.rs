//! Remediation rules, planning and execution
//!
//! Planning is pure: [`plan_remediation`] turns a non-compliant verdict into
//! a [`RemediationAction`] using the most specific enabled rule. Execution
//! goes through a [`TagWriter`] and is gated by the global switch held in
//! the [`Remediator`].

use super::pattern::ResourceTypePattern;
use super::policy::{find_tag, ComplianceVerdict, TagPolicy};
use super::retry::{retry_with_backoff, tokio_sleeper, RetryPolicy, Sleeper};
use crate::error::ApiError;
use crate::resource::ResourceRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    /// Add missing tags, never touch existing values
    #[default]
    AddTags,
    /// Add missing tags and replace disallowed values
    UpdateTags,
    /// Report only
    NotifyOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRule {
    pub resource_type: ResourceTypePattern,
    #[serde(default)]
    pub action: RemediationKind,
    #[serde(default)]
    pub default_tags: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The remediation rules document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRules {
    #[serde(default)]
    pub auto_remediation_enabled: bool,
    #[serde(default)]
    pub rules: Vec<RemediationRule>,
}

impl RemediationRules {
    /// Most specific enabled rule for a resource type; first one wins a tie
    pub fn select_rule(&self, resource_type: &str) -> Option<&RemediationRule> {
        let mut best: Option<&RemediationRule> = None;
        for rule in self.rules.iter().filter(|r| r.enabled) {
            if !rule.resource_type.matches(resource_type) {
                continue;
            }
            let better = match best {
                None => true,
                Some(current) => {
                    rule.resource_type.specificity() > current.resource_type.specificity()
                }
            };
            if better {
                best = Some(rule);
            }
        }
        best
    }
}

/// Tag diff to apply to one resource; consumed by [`Remediator::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationAction {
    pub resource_id: String,
    pub kind: RemediationKind,
    pub tags: BTreeMap<String, String>,
    /// Violations the rule has no value for
    pub unresolved: Vec<String>,
}

/// Build the action for a resource, if any
pub fn plan_remediation(
    record: &ResourceRecord,
    verdict: &ComplianceVerdict,
    policy: &TagPolicy,
    rules: &RemediationRules,
) -> Option<RemediationAction> {
    if verdict.compliant {
        return None;
    }

    let rule = rules.select_rule(&record.resource_type)?;

    if rule.action == RemediationKind::NotifyOnly {
        return Some(RemediationAction {
            resource_id: record.id.clone(),
            kind: RemediationKind::NotifyOnly,
            tags: BTreeMap::new(),
            unresolved: Vec::new(),
        });
    }

    // Rule default first, then the policy's; a value the policy rejects is no fix
    let default_for = |name: &str| -> Option<String> {
        let tag_rule = policy.rule(name);
        let from_rule = find_tag(&rule.default_tags, name).map(|(_, v)| v.to_string());
        let from_policy = tag_rule.and_then(|r| r.default_value.clone());
        [from_rule, from_policy]
            .into_iter()
            .flatten()
            .find(|value| tag_rule.map_or(true, |r| r.allows(value)))
    };

    let mut tags = BTreeMap::new();
    let mut unresolved = Vec::new();

    for name in &verdict.missing_tags {
        // Keep the spelling of an existing empty-valued key
        let key = find_tag(&record.tags, name)
            .map(|(k, _)| k.to_string())
            .unwrap_or_else(|| name.clone());
        match default_for(name) {
            Some(value) => {
                tags.insert(key, value);
            }
            None => unresolved.push(name.clone()),
        }
    }

    for name in &verdict.invalid_values {
        let fix = match rule.action {
            RemediationKind::UpdateTags => default_for(name),
            _ => None,
        };
        match (fix, find_tag(&record.tags, name)) {
            (Some(value), Some((key, _))) => {
                tags.insert(key.to_string(), value);
            }
            _ => unresolved.push(name.clone()),
        }
    }

    // Extra tags the rule stamps on; policy tags were handled above
    for (key, value) in &rule.default_tags {
        if policy.rule(key).is_none()
            && find_tag(&record.tags, key).is_none()
            && find_tag(&tags, key).is_none()
        {
            tags.insert(key.clone(), value.clone());
        }
    }

    if tags.is_empty() {
        return None;
    }

    Some(RemediationAction {
        resource_id: record.id.clone(),
        kind: rule.action,
        tags,
        unresolved,
    })
}

/// What happened to a planned action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemediationOutcome {
    Applied {
        attempts: u32,
        tags: BTreeMap<String, String>,
        /// Violations left in place for lack of a usable value
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        unresolved: Vec<String>,
    },
    /// Auto-remediation disabled; nothing was sent
    DryRun {
        tags: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        unresolved: Vec<String>,
    },
    Notified,
    Failed { attempts: u32, error: String },
}

impl RemediationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::DryRun { .. } => "dry_run",
            Self::Notified => "notified",
            Self::Failed { .. } => "failed",
        }
    }

    /// Tags that stay violating after this outcome's write
    pub fn unresolved(&self) -> &[String] {
        match self {
            Self::Applied { unresolved, .. } | Self::DryRun { unresolved, .. } => unresolved,
            Self::Notified | Self::Failed { .. } => &[],
        }
    }
}

/// Writes tags back to a resource
#[allow(async_fn_in_trait)]
pub trait TagWriter {
    async fn merge_tags(
        &self,
        resource_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError>;
}

/// Applies remediation actions
#[derive(Clone)]
pub struct Remediator {
    enabled: bool,
    retry: RetryPolicy,
    sleeper: Sleeper,
}

impl Remediator {
    pub fn new(enabled: bool, retry: RetryPolicy) -> Self {
        Self {
            enabled,
            retry,
            sleeper: tokio_sleeper(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn apply<W: TagWriter>(&self, writer: &W, action: RemediationAction) -> RemediationOutcome {
        if action.kind == RemediationKind::NotifyOnly {
            tracing::info!("Notify only: {}", action.resource_id);
            return RemediationOutcome::Notified;
        }

        if !self.enabled {
            tracing::info!(
                "Would remediate {} with {} tag(s)",
                action.resource_id,
                action.tags.len()
            );
            return RemediationOutcome::DryRun {
                tags: action.tags,
                unresolved: action.unresolved,
            };
        }

        let resource_id = action.resource_id.as_str();
        let tags = &action.tags;
        let result = retry_with_backoff(
            &self.retry,
            &self.sleeper,
            ApiError::is_retryable,
            move || writer.merge_tags(resource_id, tags),
        )
        .await;

        match result {
            Ok(((), attempts)) => {
                tracing::info!("Remediated {} ({} attempt(s))", resource_id, attempts);
                if !action.unresolved.is_empty() {
                    tracing::warn!(
                        "{} still violates {:?}: no allowed value to apply",
                        resource_id,
                        action.unresolved
                    );
                }
                RemediationOutcome::Applied {
                    attempts,
                    tags: action.tags.clone(),
                    unresolved: action.unresolved.clone(),
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Remediation failed for {} after {} attempt(s): {}",
                    resource_id,
                    err.attempts,
                    err.error
                );
                RemediationOutcome::Failed {
                    attempts: err.attempts,
                    error: err.error.to_string(),
                }
            }
        }
    }
}
