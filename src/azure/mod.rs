//! Azure Resource Manager interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - bearer token or service principal credentials from the environment
//! - [`client`] - main ARM client and URL builders
//! - [`http`] - HTTP utilities with per-call timeouts
//! - [`subscriptions`] - subscription listing
//!
//! # Example
//!
//! ```ignore
//! use aztag::azure::{auth::AzureCredentials, client::AzureClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let creds = AzureCredentials::from_env(timeout)?;
//!     let client = AzureClient::new(creds, "https://management.azure.com", timeout)?;
//!     let subs = aztag::azure::subscriptions::list_subscription_ids(&client).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod subscriptions;
