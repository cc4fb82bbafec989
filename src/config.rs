//! Configuration Management
//!
//! Three documents live in the config directory, each as `.json`, `.yaml`
//! or `.yml`:
//!
//! - `required_tags` - the tag policy
//! - `remediation_rules` - remediation rules and the global switch
//! - `settings` - thresholds, timeouts, retry and output settings
//!
//! A missing document falls back to the embedded default. A document that
//! exists but does not parse is an error: scanning against a silently
//! substituted policy would produce a misleading report.

use crate::compliance::policy::TagPolicy;
use crate::compliance::remediation::RemediationRules;
use crate::compliance::retry::RetryPolicy;
use crate::error::ComplianceError;
use crate::report::OutputFormat;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REQUIRED_TAGS: &str = include_str!("defaults/required_tags.json");
const DEFAULT_REMEDIATION_RULES: &str = include_str!("defaults/remediation_rules.json");
const DEFAULT_SETTINGS: &str = include_str!("defaults/settings.json");

const REQUIRED_TAGS: &str = "required_tags";
const REMEDIATION_RULES: &str = "remediation_rules";
const SETTINGS: &str = "settings";

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rate (%) below which a run is flagged in notifications and the dashboard
    pub compliance_threshold: f64,
    pub notification_enabled: bool,
    /// Alternative to `auto_remediation_enabled` in the rules document
    pub enable_auto_remediation: bool,
    pub request_timeout_secs: u64,
    pub max_concurrent_subscriptions: usize,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
    pub management_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compliance_threshold: 80.0,
            notification_enabled: true,
            enable_auto_remediation: false,
            request_timeout_secs: 30,
            max_concurrent_subscriptions: 4,
            retry: RetryPolicy::default(),
            output_dir: PathBuf::from("results/reports"),
            formats: vec![OutputFormat::Json, OutputFormat::Csv, OutputFormat::Html],
            management_endpoint: crate::azure::client::DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.compliance_threshold) {
            return Err(format!(
                "compliance_threshold must be between 0 and 100, got {}",
                self.compliance_threshold
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }
        if self.max_concurrent_subscriptions == 0 {
            return Err("max_concurrent_subscriptions must be at least 1".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Immutable configuration for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub policy: TagPolicy,
    pub remediation: RemediationRules,
    pub settings: Settings,
}

impl Config {
    /// Embedded defaults
    pub fn defaults() -> Self {
        // Compile-time constants, covered by `embedded_defaults_parse`
        Self {
            policy: serde_json::from_str(DEFAULT_REQUIRED_TAGS)
                .unwrap_or_else(|e| panic!("Failed to parse embedded required_tags: {}", e)),
            remediation: serde_json::from_str(DEFAULT_REMEDIATION_RULES)
                .unwrap_or_else(|e| panic!("Failed to parse embedded remediation_rules: {}", e)),
            settings: serde_json::from_str(DEFAULT_SETTINGS)
                .unwrap_or_else(|e| panic!("Failed to parse embedded settings: {}", e)),
        }
    }

    /// Load configuration from a directory
    pub fn load(dir: &Path) -> Result<Self, ComplianceError> {
        let defaults = Self::defaults();

        let policy = load_document(dir, REQUIRED_TAGS)?.unwrap_or_else(|| {
            tracing::warn!(
                "Required tags config not found in {}, using defaults",
                dir.display()
            );
            defaults.policy
        });

        let remediation = load_document(dir, REMEDIATION_RULES)?.unwrap_or_else(|| {
            tracing::warn!(
                "Remediation rules config not found in {}, using defaults",
                dir.display()
            );
            defaults.remediation
        });

        let settings: Settings = load_document(dir, SETTINGS)?.unwrap_or_else(|| {
            tracing::info!("Settings file not found, using defaults");
            defaults.settings
        });

        settings.validate().map_err(|message| ComplianceError::Config {
            path: dir.join(SETTINGS),
            message,
        })?;

        tracing::info!(
            "Loaded {} tag rule(s) and {} remediation rule(s)",
            policy.tags.len(),
            remediation.rules.len()
        );

        Ok(Self {
            policy,
            remediation,
            settings,
        })
    }

    /// Directory to read configuration from: explicit > ./config > user config dir
    pub fn resolve_dir(explicit: Option<&Path>) -> PathBuf {
        if let Some(dir) = explicit {
            return dir.to_path_buf();
        }

        let local = PathBuf::from("config");
        if local.is_dir() {
            return local;
        }

        if let Some(user) = dirs::config_dir().map(|p| p.join("aztag")) {
            if user.is_dir() {
                return user;
            }
        }

        local
    }

    /// Either switch turns remediation on
    pub fn auto_remediation_enabled(&self) -> bool {
        self.remediation.auto_remediation_enabled || self.settings.enable_auto_remediation
    }

    /// Write this configuration as JSON documents into `dir`
    pub fn export(&self, dir: &Path, overwrite: bool) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;

        let documents = [
            (REQUIRED_TAGS, serde_json::to_string_pretty(&self.policy)?),
            (REMEDIATION_RULES, serde_json::to_string_pretty(&self.remediation)?),
            (SETTINGS, serde_json::to_string_pretty(&self.settings)?),
        ];

        let mut written = Vec::new();
        for (stem, content) in documents {
            let path = dir.join(format!("{}.json", stem));
            if path.exists() && !overwrite {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            std::fs::write(&path, content + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }

        tracing::info!("Configuration exported to {}", dir.display());
        Ok(written)
    }
}

/// Load `<stem>.json|yaml|yml` from `dir`, if present
fn load_document<T: DeserializeOwned>(dir: &Path, stem: &str) -> Result<Option<T>, ComplianceError> {
    for ext in ["json", "yaml", "yml"] {
        let path = dir.join(format!("{}.{}", stem, ext));
        if !path.is_file() {
            continue;
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ComplianceError::Config {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let parsed = if ext == "json" {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };

        let value = parsed.map_err(|message| ComplianceError::Config {
            path: path.clone(),
            message,
        })?;

        tracing::info!("Loaded {}", path.display());
        return Ok(Some(value));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::remediation::RemediationKind;

    #[test]
    fn embedded_defaults_parse() {
        let config = Config::defaults();
        assert_eq!(config.policy.tags.len(), 5);
        assert_eq!(config.policy.tags[0].name, "Environment");
        assert_eq!(config.remediation.rules[0].action, RemediationKind::AddTags);
        assert!(!config.auto_remediation_enabled());
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn missing_directory_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope")).unwrap();
        assert_eq!(config, Config::defaults());
    }

    #[test]
    fn yaml_policy_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("required_tags.yaml"),
            "tags:\n  Owner:\n    required: true\n  Environment:\n    allowed_values: [Dev, Prod]\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.policy.tags.len(), 2);
        assert!(config.policy.rule("Environment").unwrap().allows("Prod"));
    }

    #[test]
    fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("remediation_rules.json"), "{ not json").unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, ComplianceError::Config { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"compliance_threshold": 150}"#,
        )
        .unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn partial_settings_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"enable_auto_remediation": true, "retry": {"max_attempts": 2}}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert!(config.auto_remediation_enabled());
        assert_eq!(config.settings.retry.max_attempts, 2);
        assert_eq!(config.settings.retry.base_delay_ms, 500);
        assert_eq!(config.settings.request_timeout_secs, 30);
    }

    #[test]
    fn export_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let written = Config::defaults().export(dir.path(), false).unwrap();
        assert_eq!(written.len(), 3);

        assert_eq!(Config::load(dir.path()).unwrap(), Config::defaults());
        assert!(Config::defaults().export(dir.path(), false).is_err());
        assert!(Config::defaults().export(dir.path(), true).is_ok());
    }
}
