//! Resource type patterns for remediation rules
//!
//! `*` matches everything, `Microsoft.Compute/*` matches a provider
//! namespace, anything else must equal the resource type. ARM resource
//! types are case-insensitive, so matching is too.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceTypePattern {
    Any,
    Prefix(String),
    Exact(String),
}

impl ResourceTypePattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            Self::Any
        } else if let Some(prefix) = raw.strip_suffix('*') {
            Self::Prefix(prefix.to_string())
        } else {
            Self::Exact(raw.to_string())
        }
    }

    pub fn matches(&self, resource_type: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => resource_type
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            Self::Exact(exact) => resource_type.eq_ignore_ascii_case(exact),
        }
    }

    /// Higher wins when several rules match the same type
    pub fn specificity(&self) -> usize {
        match self {
            Self::Any => 0,
            Self::Prefix(prefix) => 1 + prefix.len(),
            Self::Exact(_) => usize::MAX,
        }
    }
}

impl From<String> for ResourceTypePattern {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<ResourceTypePattern> for String {
    fn from(pattern: ResourceTypePattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for ResourceTypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Prefix(prefix) => write!(f, "{}*", prefix),
            Self::Exact(exact) => write!(f, "{}", exact),
        }
    }
}
