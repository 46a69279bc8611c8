//! Analytics Services
//!
//! `TrackingService` validates and records visitor events; `ReportService`
//! folds a window of recorded events into the dashboard snapshot.

mod reports;
mod tracking;

pub use reports::{conversion_rate, daily_trends, overview, product_counts, ProductCounts, ReportService};
pub use tracking::{anonymize_ip, RequestMeta, TrackOutcome, TrackingService};

use crate::directory::DirectoryError;
use crate::store::StoreError;
use std::collections::BTreeMap;

/// Per-field validation messages, keyed by request field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

// ============================================
// Error Types
// ============================================

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Validation failed")]
    Validation(FieldErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Invalid date range: {0}")]
    InvalidRange(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("Export error: {0}")]
    Export(String),
}
