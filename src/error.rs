//! Error taxonomy
//!
//! `ApiError` describes a single failed call against Azure Resource Manager.
//! `ComplianceError` classifies what a failure means for the run: fatal
//! errors abort it, everything else is collected into the report's
//! `failures` section as a [`FailureRecord`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failure of one HTTP call against ARM (or the token endpoint)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("API request failed: {status}")]
    Status { status: u16, body: String },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to parse response: {0}")]
    Decode(String),
    #[error("credentials rejected: {0}")]
    Auth(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Throttling, server-side and transport errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::Timeout | Self::Transport(_) => true,
            Self::Decode(_) | Self::Auth(_) => false,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Auth(_)) || self.status() == Some(401)
    }
}

/// Errors surfaced by a compliance run
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// No usable credentials, or the API rejected them. Aborts the run.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Nothing could be enumerated at all. Aborts the run.
    #[error("resource enumeration failed: {0}")]
    Enumeration(String),

    /// One scope (subscription) could not be scanned; the run continues.
    #[error("failed to enumerate {scope}: {message}")]
    EnumerationPartial { scope: String, message: String },

    /// A resource payload could not be evaluated (data bug); marked errored.
    #[error("failed to evaluate {resource_id}: {message}")]
    Evaluation {
        resource_id: String,
        message: String,
    },

    #[error("remediation of {resource_id} failed after {attempts} attempt(s): {message}")]
    Remediation {
        resource_id: String,
        attempts: u32,
        message: String,
    },

    /// Only the affected output format is lost.
    #[error("failed to write {format} report to {}: {message}", path.display())]
    ReportWrite {
        format: String,
        path: PathBuf,
        message: String,
    },

    #[error("invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl ComplianceError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::Enumeration(_) | Self::Config { .. }
        )
    }

    /// Convert a non-fatal error into the record kept in the report
    pub fn to_failure(&self) -> Option<FailureRecord> {
        let (kind, scope) = match self {
            Self::EnumerationPartial { scope, .. } => (FailureKind::Enumeration, scope.clone()),
            Self::Evaluation { resource_id, .. } => (FailureKind::Evaluation, resource_id.clone()),
            Self::Remediation { resource_id, .. } => {
                (FailureKind::Remediation, resource_id.clone())
            }
            Self::ReportWrite { format, .. } => (FailureKind::ReportWrite, format.clone()),
            Self::Authentication(_) | Self::Enumeration(_) | Self::Config { .. } => return None,
        };

        Some(FailureRecord {
            kind,
            scope,
            message: self.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Enumeration,
    Evaluation,
    Remediation,
    ReportWrite,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enumeration => "enumeration",
            Self::Evaluation => "evaluation",
            Self::Remediation => "remediation",
            Self::ReportWrite => "report_write",
        }
    }
}

/// Non-fatal failure as it appears in the report
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub scope: String,
    pub message: String,
}
