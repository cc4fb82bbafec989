//! aztag - Azure tag compliance scanner
//!
//! Enumerates resources across subscriptions, checks their tags against a
//! policy, optionally merges missing tags back, and writes JSON, CSV and
//! HTML reports.

pub mod azure;
pub mod compliance;
pub mod config;
pub mod error;
pub mod notification;
pub mod report;
pub mod resource;

pub use config::Config;
pub use error::{ApiError, ComplianceError};
