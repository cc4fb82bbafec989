//! Compliance evaluation and remediation
//!
//! # Architecture
//!
//! - [`policy`] - tag rules and the pure evaluator
//! - [`pattern`] - resource type patterns used by remediation rules
//! - [`remediation`] - rule selection, diff planning and the remediator
//! - [`retry`] - bounded exponential backoff with an injectable sleeper
//! - [`aggregate`] - order-independent report aggregation
//! - [`pipeline`] - the scan that ties everything together

pub mod aggregate;
pub mod pattern;
pub mod pipeline;
pub mod policy;
pub mod remediation;
pub mod retry;

pub use aggregate::{ComplianceReport, ReportAccumulator, ResourceResult};
pub use pipeline::{run_scan, ScanOptions};
pub use policy::{evaluate, ComplianceVerdict, EmptyValueHandling, TagPolicy, TagRule};
pub use remediation::{RemediationAction, RemediationOutcome, RemediationRules, Remediator};
