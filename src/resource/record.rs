//! Resource snapshot taken at scan time

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Placeholder when an id has no `resourceGroups` segment
pub const UNKNOWN_RESOURCE_GROUP: &str = "unknown";

/// One resource as returned by the resources list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub subscription_id: String,
    pub resource_group: String,
}

impl ResourceRecord {
    /// Build a record from an ARM resource payload
    ///
    /// Fails only when `id` or `type` is missing, which means the payload is
    /// not a resource at all.
    pub fn from_arm(value: &Value, subscription_id: &str) -> Result<Self, String> {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "resource payload has no id".to_string())?;

        let resource_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("resource {} has no type", id))?;

        let name = value
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| extract_short_name(id));

        let location = value
            .get("location")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        // ARM returns `null` or omits `tags` for untagged resources
        let tags = value
            .get("tags")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => s.clone(),
                            Value::Null => String::new(),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: id.to_string(),
            name,
            resource_type: resource_type.to_string(),
            location,
            tags,
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group_from_id(id),
        })
    }
}

/// Extract the resource group segment from a resource id
/// e.g. "/subscriptions/s/resourceGroups/rg-web/providers/..." -> "rg-web"
pub fn resource_group_from_id(id: &str) -> String {
    let mut parts = id.split('/').filter(|p| !p.is_empty());
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case("resourceGroups") {
            if let Some(group) = parts.next() {
                return group.to_string();
            }
        }
    }
    UNKNOWN_RESOURCE_GROUP.to_string()
}

/// Extract the last path segment of a resource id
fn extract_short_name(id: &str) -> String {
    id.rsplit('/').next().unwrap_or(id).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_arm_payload() {
        let value = json!({
            "id": "/subscriptions/sub-1/resourceGroups/rg-web/providers/Microsoft.Web/sites/app1",
            "name": "app1",
            "type": "Microsoft.Web/sites",
            "location": "westeurope",
            "tags": {"Environment": "Prod", "Owner": "team-a"}
        });

        let record = ResourceRecord::from_arm(&value, "sub-1").unwrap();
        assert_eq!(record.name, "app1");
        assert_eq!(record.resource_group, "rg-web");
        assert_eq!(record.tags.get("Environment").map(String::as_str), Some("Prod"));
    }

    #[test]
    fn null_tags_become_empty_map() {
        let value = json!({
            "id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/vnets/v",
            "type": "Microsoft.Network/virtualNetworks",
            "tags": null
        });
        let record = ResourceRecord::from_arm(&value, "sub-1").unwrap();
        assert!(record.tags.is_empty());
        assert_eq!(record.name, "v");
    }

    #[test]
    fn missing_type_is_rejected() {
        let value = json!({"id": "/subscriptions/s/resourceGroups/rg/x"});
        assert!(ResourceRecord::from_arm(&value, "s").is_err());
        assert!(ResourceRecord::from_arm(&json!({}), "s").is_err());
    }

    #[test]
    fn resource_group_is_case_insensitive() {
        assert_eq!(
            resource_group_from_id("/subscriptions/s/resourcegroups/RG-1/providers/x/y/z"),
            "RG-1"
        );
        assert_eq!(resource_group_from_id("/subscriptions/s"), UNKNOWN_RESOURCE_GROUP);
    }
}
