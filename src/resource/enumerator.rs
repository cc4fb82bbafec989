//! Resource Enumerator
//!
//! Pages through the resources of a subscription.

use super::record::ResourceRecord;
use crate::azure::client::AzureClient;
use crate::azure::subscriptions::next_link;
use crate::error::ApiError;
use serde_json::Value;

/// Server-side filter for the resources list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub resource_group: Option<String>,
    pub resource_type: Option<String>,
}

impl ResourceFilter {
    /// Build the OData `$filter` expression, if any
    pub fn to_odata(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(group) = &self.resource_group {
            clauses.push(format!("resourceGroup eq '{}'", escape_odata(group)));
        }
        if let Some(kind) = &self.resource_type {
            clauses.push(format!("resourceType eq '{}'", escape_odata(kind)));
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" and "))
        }
    }
}

/// OData string literals escape a quote by doubling it
fn escape_odata(value: &str) -> String {
    value.replace('\'', "''")
}

/// Result of one page fetch
pub struct PaginatedResult {
    pub items: Vec<Value>,
    pub next_link: Option<String>,
}

/// Lazily walks the pages of one subscription
///
/// A pager is single-use; build a new one to restart the listing.
pub struct ResourcePager<'a> {
    client: &'a AzureClient,
    next: Option<String>,
    pages: usize,
}

impl<'a> ResourcePager<'a> {
    pub fn new(client: &'a AzureClient, subscription_id: &str, filter: &ResourceFilter) -> Self {
        let odata = filter.to_odata();
        Self {
            client,
            next: Some(client.resources_url(subscription_id, odata.as_deref())),
            pages: 0,
        }
    }

    /// Fetch the next page, or `None` once the listing is exhausted
    pub async fn next_page(&mut self) -> Result<Option<PaginatedResult>, ApiError> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        let response = self.client.get(&url).await?;
        self.pages += 1;

        let items = response
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let next_link = next_link(&response);
        self.next = next_link.clone();

        Ok(Some(PaginatedResult { items, next_link }))
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

/// Resources of one subscription, split into usable records and payloads
/// that could not be turned into a record
#[derive(Debug, Default)]
pub struct SubscriptionListing {
    pub records: Vec<ResourceRecord>,
    pub malformed: Vec<(String, String)>,
}

/// Fetch all resources of a subscription (auto-paginate)
///
/// Any page failure fails the whole listing so a subscription is either
/// fully enumerated or not at all.
pub async fn list_resources(
    client: &AzureClient,
    subscription_id: &str,
    filter: &ResourceFilter,
) -> Result<SubscriptionListing, ApiError> {
    let mut pager = ResourcePager::new(client, subscription_id, filter);
    let mut listing = SubscriptionListing::default();

    while let Some(page) = pager.next_page().await? {
        for item in page.items {
            match ResourceRecord::from_arm(&item, subscription_id) {
                Ok(record) => listing.records.push(record),
                Err(message) => {
                    let id = item
                        .get("id")
                        .or_else(|| item.get("name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("<unnamed>")
                        .to_string();
                    listing.malformed.push((id, message));
                }
            }
        }

        if pager.pages_fetched() % 10 == 0 {
            tracing::debug!(
                "Subscription {}: {} resources after {} pages",
                subscription_id,
                listing.records.len(),
                pager.pages_fetched()
            );
        }
    }

    tracing::info!(
        "Subscription {}: {} resources in {} page(s)",
        subscription_id,
        listing.records.len(),
        pager.pages_fetched()
    );

    Ok(listing)
}
