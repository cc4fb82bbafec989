//! HTTP utilities for ARM REST API calls

use crate::error::ApiError;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate long responses and strip control characters for logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("aztag/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url).bearer_auth(token)).await
    }

    pub async fn patch(&self, url: &str, token: &str, body: &Value) -> Result<Value, ApiError> {
        tracing::debug!("PATCH {}", url);
        self.send(self.client.patch(url).bearer_auth(token).json(body))
            .await
    }

    /// POST without authentication (webhooks)
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        tracing::debug!("POST {}", sanitize_url(url));
        self.send(self.client.post(url).json(body)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: sanitize_for_log(&body),
            });
        }

        // Webhooks answer with plain text ("ok", "1"), PATCH may answer empty
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(_) if !body.trim_start().starts_with(['{', '[']) => {
                Ok(Value::String(body.trim().to_string()))
            }
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }
}

pub(crate) fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(error.without_url().to_string())
    }
}

/// Webhook URLs embed their secret in the path; log only the host
fn sanitize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}/...",
            parsed.scheme(),
            parsed.host_str().unwrap_or("?")
        ),
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Format an ARM API error for display
/// Maps raw statuses to actionable messages without echoing API bodies
pub fn format_api_error(error: &ApiError) -> String {
    match error {
        ApiError::Status { status, .. } => match status {
            401 => "Authentication failed. Check AZURE_ACCESS_TOKEN or the service principal."
                .to_string(),
            403 => "Permission denied. The principal needs Reader (and Tag Contributor to remediate)."
                .to_string(),
            404 => "Resource not found.".to_string(),
            409 => "Resource conflict. The resource may be locked or being modified.".to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            400 => "Invalid request. Check your parameters.".to_string(),
            500..=599 => "Azure service temporarily unavailable. Please try again.".to_string(),
            other => format!("Request failed with status {}.", other),
        },
        ApiError::Timeout => "Request timed out.".to_string(),
        ApiError::Transport(_) => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        ApiError::Decode(_) => "Unexpected response from Azure.".to_string(),
        ApiError::Auth(msg) => format!("Authentication failed: {}", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(out.contains("500 bytes total"));
    }

    #[test]
    fn sanitize_url_hides_webhook_path() {
        let out = sanitize_url("https://hooks.slack.com/services/T000/B000/secret");
        assert_eq!(out, "https://hooks.slack.com/...");
    }

    #[test]
    fn format_api_error_maps_statuses() {
        let err = ApiError::Status {
            status: 429,
            body: String::new(),
        };
        assert!(format_api_error(&err).contains("Rate limit"));
        assert_eq!(format_api_error(&ApiError::Timeout), "Request timed out.");
    }
}
