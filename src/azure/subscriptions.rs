//! Azure Subscriptions
//!
//! Functions for listing the subscriptions visible to the credentials.

use super::client::AzureClient;
use crate::error::ApiError;
use serde_json::Value;

/// Subscription information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: String,
    pub state: String,
}

impl Subscription {
    pub fn is_enabled(&self) -> bool {
        self.state.eq_ignore_ascii_case("Enabled")
    }
}

impl From<&Value> for Subscription {
    fn from(value: &Value) -> Self {
        Self {
            subscription_id: value
                .get("subscriptionId")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            display_name: value
                .get("displayName")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            state: value
                .get("state")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string(),
        }
    }
}

/// List all accessible subscriptions, following `nextLink`
pub async fn list_subscriptions(client: &AzureClient) -> Result<Vec<Subscription>, ApiError> {
    let mut subscriptions = Vec::new();
    let mut next = Some(client.subscriptions_url());

    while let Some(url) = next {
        let response = client.get(&url).await?;

        if let Some(arr) = response.get("value").and_then(|v| v.as_array()) {
            subscriptions.extend(arr.iter().map(Subscription::from));
        }

        next = next_link(&response);
    }

    Ok(subscriptions)
}

/// Get ids of subscriptions that can be scanned
pub async fn list_subscription_ids(client: &AzureClient) -> Result<Vec<String>, ApiError> {
    let subscriptions = list_subscriptions(client).await?;
    Ok(subscriptions
        .into_iter()
        .filter(|s| {
            if !s.is_enabled() {
                tracing::info!(
                    "Skipping subscription {} ({}) in state {}",
                    s.subscription_id,
                    s.display_name,
                    s.state
                );
            }
            s.is_enabled()
        })
        .map(|s| s.subscription_id)
        .collect())
}

/// ARM paginates with an absolute `nextLink`
pub(crate) fn next_link(response: &Value) -> Option<String> {
    response
        .get("nextLink")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscription_from_value() {
        let sub = Subscription::from(&json!({
            "subscriptionId": "0000-1111",
            "displayName": "Production",
            "state": "Enabled"
        }));
        assert_eq!(sub.subscription_id, "0000-1111");
        assert!(sub.is_enabled());

        let disabled = Subscription::from(&json!({"subscriptionId": "x", "state": "Disabled"}));
        assert!(!disabled.is_enabled());
        assert_eq!(disabled.display_name, "-");
    }

    #[test]
    fn next_link_ignores_empty() {
        assert_eq!(next_link(&json!({"nextLink": ""})), None);
        assert_eq!(
            next_link(&json!({"nextLink": "https://x/next"})),
            Some("https://x/next".to_string())
        );
    }
}
