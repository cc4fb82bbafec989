//! Azure Authentication
//!
//! Credentials are read from the environment: either a pre-issued bearer
//! token (`AZURE_ACCESS_TOKEN`) or a service principal
//! (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`) exchanged
//! through the client-credentials grant.

use crate::azure::http::map_transport_error;
use crate::error::{ApiError, ComplianceError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Scope for Azure Resource Manager access
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Default Microsoft Entra authority
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Used when the token endpoint does not report a lifetime
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
enum CredentialSource {
    StaticToken(String),
    ClientSecret {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

/// Azure credentials holder with token caching
#[derive(Clone)]
pub struct AzureCredentials {
    source: CredentialSource,
    http: Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// v1 endpoints return this as a string, v2 as a number
    #[serde(default)]
    expires_in: Option<Value>,
}

impl TokenResponse {
    fn lifetime(&self) -> Duration {
        let secs = match &self.expires_in {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        secs.map(Duration::from_secs).unwrap_or(DEFAULT_TOKEN_TTL)
    }
}

impl AzureCredentials {
    /// Use a bearer token issued elsewhere (e.g. `az account get-access-token`)
    pub fn static_token(token: &str) -> Self {
        Self {
            source: CredentialSource::StaticToken(token.to_string()),
            http: Client::new(),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Use a service principal secret against the given authority host.
    /// Token requests are bounded by `timeout` like every ARM call.
    pub fn client_secret(
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("aztag/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            source: CredentialSource::ClientSecret {
                authority: authority.trim_end_matches('/').to_string(),
                tenant_id: tenant_id.to_string(),
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            },
            http,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Resolve credentials from the process environment
    pub fn from_env(timeout: Duration) -> Result<Self, ComplianceError> {
        if let Some(token) = non_empty_var("AZURE_ACCESS_TOKEN") {
            tracing::info!("Using bearer token from AZURE_ACCESS_TOKEN");
            return Ok(Self::static_token(&token));
        }

        let tenant = non_empty_var("AZURE_TENANT_ID");
        let client = non_empty_var("AZURE_CLIENT_ID");
        let secret = non_empty_var("AZURE_CLIENT_SECRET");

        match (tenant, client, secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                let authority = non_empty_var("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string());
                tracing::info!("Using service principal {} in tenant {}", client_id, tenant_id);
                Self::client_secret(
                    &authority,
                    &tenant_id,
                    &client_id,
                    &client_secret,
                    timeout,
                )
                .map_err(|e| ComplianceError::Authentication(e.to_string()))
            }
            _ => Err(ComplianceError::Authentication(
                "no Azure credentials found. Set AZURE_ACCESS_TOKEN, or AZURE_TENANT_ID, \
                 AZURE_CLIENT_ID and AZURE_CLIENT_SECRET"
                    .to_string(),
            )),
        }
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String, ApiError> {
        let (authority, tenant_id, client_id, client_secret) = match &self.source {
            CredentialSource::StaticToken(token) => return Ok(token.clone()),
            CredentialSource::ClientSecret {
                authority,
                tenant_id,
                client_id,
                client_secret,
            } => (authority, tenant_id, client_id, client_secret),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", authority, tenant_id);
        let body = format!(
            "grant_type=client_credentials&client_id={}&client_secret={}&scope={}",
            urlencoding::encode(client_id),
            urlencoding::encode(client_secret),
            urlencoding::encode(MANAGEMENT_SCOPE),
        );

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            // The body may echo request details; only the status is kept
            return Err(ApiError::Auth(format!("token endpoint returned {}", status)));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;

        let lifetime = token.lifetime();
        let expires_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.access_token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            lifetime.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token.access_token)
    }

    /// Drop the cached token so the next call fetches a fresh one
    pub async fn invalidate(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
