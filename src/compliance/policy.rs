//! Tag policy and evaluator
//!
//! A policy is an ordered list of [`TagRule`]s. The policy document accepts
//! either a list (`{"tags": [{"name": "Owner", ...}]}`) or a map keyed by
//! tag name (`{"tags": {"Owner": {...}}}`).
//!
//! Tag names are compared case-insensitively, as ARM does. Values are
//! compared exactly.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How a tag that is present with an empty value is judged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValueHandling {
    /// `Owner = ""` counts as a missing `Owner` tag
    #[default]
    Missing,
    /// `Owner = ""` counts as present (and is still checked against allowed values)
    Present,
}

/// Constraint on a single tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    pub name: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl TagRule {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            allowed_values: None,
            default_value: None,
            description: None,
        }
    }

    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// A value is allowed when there is no allowed set or it is in the set
    pub fn allows(&self, value: &str) -> bool {
        match &self.allowed_values {
            Some(values) => values.iter().any(|v| v == value),
            None => true,
        }
    }
}

/// Map-form rule body; the name comes from the key
#[derive(Deserialize)]
struct RuleBody {
    #[serde(default = "default_true")]
    required: bool,
    #[serde(default)]
    allowed_values: Option<Vec<String>>,
    #[serde(default)]
    default_value: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRules {
    List(Vec<TagRule>),
    Map(BTreeMap<String, RuleBody>),
}

#[derive(Deserialize)]
struct RawPolicy {
    #[serde(default)]
    tags: Option<RawRules>,
    #[serde(default)]
    empty_value_handling: EmptyValueHandling,
}

/// The declarative set of tag rules, validated at load time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct TagPolicy {
    pub tags: Vec<TagRule>,
    pub empty_value_handling: EmptyValueHandling,
}

impl TryFrom<RawPolicy> for TagPolicy {
    type Error = String;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let tags = match raw.tags {
            None => Vec::new(),
            Some(RawRules::List(rules)) => rules,
            Some(RawRules::Map(map)) => map
                .into_iter()
                .map(|(name, body)| TagRule {
                    name,
                    required: body.required,
                    allowed_values: body.allowed_values,
                    default_value: body.default_value,
                    description: body.description,
                })
                .collect(),
        };
        TagPolicy::new(tags, raw.empty_value_handling)
    }
}

impl TagPolicy {
    /// Build a policy, rejecting rule sets that cannot be evaluated sensibly
    pub fn new(tags: Vec<TagRule>, empty_value_handling: EmptyValueHandling) -> Result<Self, String> {
        let mut seen = HashSet::new();
        for rule in &tags {
            if rule.name.trim().is_empty() {
                return Err("tag rule with an empty name".to_string());
            }
            if !seen.insert(rule.name.to_ascii_lowercase()) {
                return Err(format!("tag '{}' is defined more than once", rule.name));
            }
            if let Some(values) = &rule.allowed_values {
                if values.is_empty() {
                    return Err(format!("tag '{}' has an empty allowed_values list", rule.name));
                }
                if let Some(default) = &rule.default_value {
                    if !rule.allows(default) {
                        return Err(format!(
                            "default value '{}' of tag '{}' is not an allowed value",
                            default, rule.name
                        ));
                    }
                }
            }
        }

        Ok(Self {
            tags,
            empty_value_handling,
        })
    }

    pub fn rule(&self, name: &str) -> Option<&TagRule> {
        self.tags.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn required_tag_names(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|r| r.required)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Evaluate a set of tags against this policy
    pub fn evaluate(&self, tags: &BTreeMap<String, String>) -> ComplianceVerdict {
        evaluate(tags, self)
    }
}

/// Outcome of checking one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub missing_tags: Vec<String>,
    pub invalid_values: Vec<String>,
    pub compliant: bool,
}

impl ComplianceVerdict {
    pub fn new(missing_tags: Vec<String>, invalid_values: Vec<String>) -> Self {
        let compliant = missing_tags.is_empty() && invalid_values.is_empty();
        Self {
            missing_tags,
            invalid_values,
            compliant,
        }
    }
}

/// Find a tag by name: exact key first, then case-insensitive
pub fn find_tag<'a>(tags: &'a BTreeMap<String, String>, name: &str) -> Option<(&'a str, &'a str)> {
    if let Some((k, v)) = tags.get_key_value(name) {
        return Some((k.as_str(), v.as_str()));
    }
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(k, v)| (k.as_str(), v.as_str()))
}

/// Check tags against the policy's rules, in rule order
pub fn evaluate(tags: &BTreeMap<String, String>, policy: &TagPolicy) -> ComplianceVerdict {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for rule in &policy.tags {
        let value = find_tag(tags, &rule.name).map(|(_, v)| v).filter(|v| {
            !(v.is_empty() && policy.empty_value_handling == EmptyValueHandling::Missing)
        });

        match value {
            None if rule.required => missing.push(rule.name.clone()),
            None => {}
            Some(v) if !rule.allows(v) => invalid.push(rule.name.clone()),
            Some(_) => {}
        }
    }

    ComplianceVerdict::new(missing, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn env_policy() -> TagPolicy {
        TagPolicy::new(
            vec![
                TagRule::required("Environment").with_allowed_values(&["Dev", "Test", "Prod"]),
                TagRule::required("Owner"),
            ],
            EmptyValueHandling::Missing,
        )
        .unwrap()
    }

    #[test]
    fn disallowed_value_is_invalid() {
        let verdict = evaluate(&tags(&[("Environment", "Stage"), ("Owner", "a")]), &env_policy());
        assert!(!verdict.compliant);
        assert_eq!(verdict.invalid_values, vec!["Environment"]);
        assert!(verdict.missing_tags.is_empty());
    }

    #[test]
    fn untagged_resource_misses_every_required_tag() {
        let verdict = evaluate(&BTreeMap::new(), &env_policy());
        assert!(!verdict.compliant);
        assert_eq!(verdict.missing_tags.len(), 2);
    }

    #[test]
    fn fully_tagged_resource_is_compliant() {
        let verdict = evaluate(&tags(&[("Environment", "Prod"), ("Owner", "a")]), &env_policy());
        assert!(verdict.compliant);
    }

    #[test]
    fn tag_names_match_case_insensitively() {
        let verdict = evaluate(&tags(&[("environment", "Prod"), ("OWNER", "a")]), &env_policy());
        assert!(verdict.compliant);
    }

    #[test]
    fn values_match_case_sensitively() {
        let verdict = evaluate(&tags(&[("Environment", "prod"), ("Owner", "a")]), &env_policy());
        assert_eq!(verdict.invalid_values, vec!["Environment"]);
    }

    #[test]
    fn empty_value_handling() {
        let resource = tags(&[("Environment", "Prod"), ("Owner", "")]);

        let verdict = evaluate(&resource, &env_policy());
        assert_eq!(verdict.missing_tags, vec!["Owner"]);

        let mut lenient = env_policy();
        lenient.empty_value_handling = EmptyValueHandling::Present;
        assert!(evaluate(&resource, &lenient).compliant);
    }

    #[test]
    fn optional_tags_are_validated_when_present() {
        let policy = TagPolicy::new(
            vec![TagRule::required("Tier")
                .with_allowed_values(&["Gold", "Silver"])
                .optional()],
            EmptyValueHandling::Missing,
        )
        .unwrap();

        assert!(evaluate(&BTreeMap::new(), &policy).compliant);
        let verdict = evaluate(&tags(&[("Tier", "Bronze")]), &policy);
        assert_eq!(verdict.invalid_values, vec!["Tier"]);
    }

    #[test]
    fn policy_document_list_form() {
        let policy: TagPolicy = serde_json::from_value(json!({
            "tags": [
                {"name": "Environment", "allowed_values": ["Dev", "Prod"], "default_value": "Dev"},
                {"name": "Notes", "required": false}
            ]
        }))
        .unwrap();

        assert_eq!(policy.tags.len(), 2);
        assert!(policy.tags[0].required);
        assert_eq!(policy.required_tag_names(), vec!["Environment"]);
        assert_eq!(policy.empty_value_handling, EmptyValueHandling::Missing);
    }

    #[test]
    fn policy_document_map_form() {
        let policy: TagPolicy = serde_json::from_value(json!({
            "empty_value_handling": "present",
            "tags": {
                "Owner": {"description": "team"},
                "CostCenter": {"required": true}
            }
        }))
        .unwrap();

        assert_eq!(policy.tags.len(), 2);
        assert!(policy.rule("owner").is_some());
        assert_eq!(policy.empty_value_handling, EmptyValueHandling::Present);
    }

    #[test]
    fn policy_rejects_duplicates_and_bad_defaults() {
        let dup = serde_json::from_value::<TagPolicy>(json!({
            "tags": [{"name": "Owner"}, {"name": "owner"}]
        }));
        assert!(dup.is_err());

        let bad_default = serde_json::from_value::<TagPolicy>(json!({
            "tags": [{"name": "Env", "allowed_values": ["Dev"], "default_value": "Prod"}]
        }));
        assert!(bad_default.is_err());
    }
}
