//! Webhook notifications
//!
//! Posts a compliance summary to Slack (attachment payload) and Microsoft
//! Teams (MessageCard payload). Delivery problems are logged and counted,
//! never raised: a failed notification must not fail the run.

use crate::azure::http::{format_api_error, ArmHttpClient};
use crate::compliance::aggregate::ComplianceReport;
use serde_json::{json, Value};
use std::time::Duration;

pub const SLACK_WEBHOOK_ENV: &str = "SLACK_WEBHOOK_URL";
pub const TEAMS_WEBHOOK_ENV: &str = "TEAMS_WEBHOOK_URL";

const FOOTER: &str = "Azure Tag Compliance Automation";

/// Where to send notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Platform {
    Slack,
    Teams,
    #[default]
    Both,
}

impl Platform {
    fn includes_slack(&self) -> bool {
        matches!(self, Self::Slack | Self::Both)
    }

    fn includes_teams(&self) -> bool {
        matches!(self, Self::Teams | Self::Both)
    }
}

/// Traffic-light status derived from the compliance rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceStatus {
    Good,
    Warning,
    Danger,
}

impl ComplianceStatus {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 90.0 {
            Self::Good
        } else if rate >= 75.0 {
            Self::Warning
        } else {
            Self::Danger
        }
    }

    /// Slack attachment color
    pub fn color(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }

    /// Teams theme color
    pub fn hex(&self) -> &'static str {
        match self {
            Self::Good => "2EB886",
            Self::Warning => "DAA038",
            Self::Danger => "A30200",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Good => "✅",
            Self::Warning => "⚠️",
            Self::Danger => "❌",
        }
    }
}

/// Platform-neutral message
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub title: String,
    pub text: String,
    pub status: ComplianceStatus,
    pub timestamp: i64,
    pub fields: Vec<(String, String)>,
}

pub fn format_message(report: &ComplianceReport, report_url: Option<&str>) -> NotificationMessage {
    let s = &report.summary;
    let status = ComplianceStatus::from_rate(s.overall_compliance_rate);

    let mut fields = vec![
        ("Overall Compliance Rate".to_string(), format!("{:.2}%", s.overall_compliance_rate)),
        ("Total Resources".to_string(), s.total_resources.to_string()),
        ("Compliant".to_string(), s.compliant.to_string()),
        ("Non-Compliant".to_string(), s.non_compliant.to_string()),
        ("Remediated".to_string(), s.remediated.to_string()),
    ];
    if !report.unscanned_subscriptions.is_empty() {
        fields.push((
            "Unscanned Subscriptions".to_string(),
            report.unscanned_subscriptions.len().to_string(),
        ));
    }
    if !report.failures.is_empty() {
        fields.push(("Failures".to_string(), report.failures.len().to_string()));
    }
    if let Some(url) = report_url {
        fields.push(("Full Report".to_string(), url.to_string()));
    }

    NotificationMessage {
        title: format!("{} Azure Tag Compliance Report", status.icon()),
        text: format!(
            "Compliance check completed at {}",
            report.scan_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        status,
        timestamp: report.scan_timestamp.timestamp(),
        fields,
    }
}

pub fn slack_payload(message: &NotificationMessage) -> Value {
    let fields: Vec<Value> = message
        .fields
        .iter()
        .map(|(name, value)| json!({ "title": name, "value": value, "short": true }))
        .collect();

    json!({
        "text": message.title,
        "attachments": [{
            "color": message.status.color(),
            "text": message.text,
            "fields": fields,
            "footer": FOOTER,
            "ts": message.timestamp,
        }]
    })
}

pub fn teams_payload(message: &NotificationMessage) -> Value {
    let facts: Vec<Value> = message
        .fields
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "summary": message.title,
        "themeColor": message.status.hex(),
        "title": message.title,
        "text": message.text,
        "sections": [{ "facts": facts }],
    })
}

/// Sends messages to the configured webhooks
pub struct Notifier {
    http: ArmHttpClient,
    slack_webhook: Option<String>,
    teams_webhook: Option<String>,
}

impl Notifier {
    pub fn new(
        slack_webhook: Option<String>,
        teams_webhook: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = ArmHttpClient::new(timeout).map_err(|e| anyhow::anyhow!(format_api_error(&e)))?;
        Ok(Self {
            http,
            slack_webhook: slack_webhook.filter(|u| !u.trim().is_empty()),
            teams_webhook: teams_webhook.filter(|u| !u.trim().is_empty()),
        })
    }

    /// Webhook URLs from `SLACK_WEBHOOK_URL` and `TEAMS_WEBHOOK_URL`
    pub fn from_env(timeout: Duration) -> anyhow::Result<Self> {
        Self::new(
            std::env::var(SLACK_WEBHOOK_ENV).ok(),
            std::env::var(TEAMS_WEBHOOK_ENV).ok(),
            timeout,
        )
    }

    /// Send to the selected platforms, returning how many were delivered
    pub async fn send(&self, platform: Platform, message: &NotificationMessage) -> usize {
        let mut delivered = 0;

        if platform.includes_slack()
            && self
                .post("Slack", self.slack_webhook.as_deref(), SLACK_WEBHOOK_ENV, &slack_payload(message))
                .await
        {
            delivered += 1;
        }

        if platform.includes_teams()
            && self
                .post("Teams", self.teams_webhook.as_deref(), TEAMS_WEBHOOK_ENV, &teams_payload(message))
                .await
        {
            delivered += 1;
        }

        delivered
    }

    async fn post(&self, name: &str, url: Option<&str>, env: &str, payload: &Value) -> bool {
        let Some(url) = url else {
            tracing::warn!("{} webhook not configured ({} is unset)", name, env);
            return false;
        };

        match self.http.post_json(url, payload).await {
            Ok(_) => {
                tracing::info!("{} notification sent", name);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to send {} notification: {}", name, format_api_error(&e));
                false
            }
        }
    }
}
