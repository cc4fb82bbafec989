//! Azure Client
//!
//! Main client for Azure Resource Manager, combining authentication
//! and HTTP functionality.

use super::auth::AzureCredentials;
use super::http::ArmHttpClient;
use crate::compliance::remediation::TagWriter;
use crate::error::ApiError;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Public cloud ARM endpoint
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// api-version for the subscriptions list
pub const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";

/// api-version for resource listing and the Tags API
pub const RESOURCES_API_VERSION: &str = "2021-04-01";

/// Main Azure client
#[derive(Clone)]
pub struct AzureClient {
    pub credentials: AzureCredentials,
    pub http: ArmHttpClient,
    endpoint: String,
}

impl AzureClient {
    /// Create a client for the given management endpoint
    pub fn new(
        credentials: AzureCredentials,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            credentials,
            http: ArmHttpClient::new(timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Make a GET request to an ARM URL
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.credentials.get_token().await?;
        let result = self.http.get(url, &token).await;
        self.on_result(result).await
    }

    /// Make a PATCH request to an ARM URL
    pub async fn patch(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        let token = self.credentials.get_token().await?;
        let result = self.http.patch(url, &token, body).await;
        self.on_result(result).await
    }

    async fn on_result(&self, result: Result<Value, ApiError>) -> Result<Value, ApiError> {
        if let Err(err) = &result {
            if err.is_auth_failure() {
                // A rotated secret should not keep failing on a stale token
                self.credentials.invalidate().await;
            }
        }
        result
    }

    // =========================================================================
    // Resource Manager URL helpers
    // =========================================================================

    /// Build an ARM URL from a path and api-version
    pub fn arm_url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, api_version)
    }

    pub fn subscriptions_url(&self) -> String {
        self.arm_url("/subscriptions", SUBSCRIPTIONS_API_VERSION)
    }

    /// Resources in a subscription, with an optional OData `$filter`
    pub fn resources_url(&self, subscription_id: &str, filter: Option<&str>) -> String {
        let url = self.arm_url(
            &format!("/subscriptions/{}/resources", subscription_id),
            RESOURCES_API_VERSION,
        );
        match filter {
            Some(filter) => format!("{}&$filter={}", url, urlencoding::encode(filter)),
            None => url,
        }
    }

    /// Tags API endpoint of a resource
    pub fn tags_url(&self, resource_id: &str) -> String {
        self.arm_url(
            &format!("{}/providers/Microsoft.Resources/tags/default", resource_id),
            RESOURCES_API_VERSION,
        )
    }
}

impl TagWriter for AzureClient {
    /// Merge tags into the resource; existing tags not in `tags` are kept
    async fn merge_tags(
        &self,
        resource_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        let body = json!({
            "operation": "Merge",
            "properties": { "tags": tags },
        });
        self.patch(&self.tags_url(resource_id), &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AzureClient {
        AzureClient::new(
            AzureCredentials::static_token("t"),
            "https://management.azure.com/",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn resources_url_encodes_filter() {
        let url = client().resources_url("sub-1", Some("resourceGroup eq 'rg-a'"));
        assert_eq!(
            url,
            "https://management.azure.com/subscriptions/sub-1/resources?api-version=2021-04-01\
             &$filter=resourceGroup%20eq%20%27rg-a%27"
        );
    }

    #[test]
    fn tags_url_appends_provider_path() {
        let id = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/sa";
        let url = client().tags_url(id);
        assert!(url.starts_with("https://management.azure.com/subscriptions/s/"));
        assert!(url.ends_with("/sa/providers/Microsoft.Resources/tags/default?api-version=2021-04-01"));
    }
}
