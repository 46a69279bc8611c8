//! Storefront Analytics
//!
//! Visitor event tracking for storefront businesses:
//! - Anonymous visitor ids and a session-deduplicating client emitter
//! - Validated, enriched event ingestion into an append-only log
//! - Dashboard snapshots: overview counters, daily trends, top products and
//!   conversion rate over a time window

pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod extractors;
pub mod models;
pub mod services;
pub mod store;

use clock::Clock;
use config::AnalyticsConfig;
use directory::CatalogDirectory;
use services::{ReportService, TrackingService};
use std::sync::Arc;
use store::EventStore;

/// Shared application state handed to every handler.
pub struct AnalyticsApp {
    pub config: AnalyticsConfig,
    pub tracking: TrackingService,
    pub reports: ReportService,
}

impl AnalyticsApp {
    pub fn new(
        config: AnalyticsConfig,
        store: Arc<dyn EventStore>,
        directory: Arc<dyn CatalogDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tracking = TrackingService::new(
            store.clone(),
            directory.clone(),
            clock.clone(),
            config.clone(),
        );
        let reports = ReportService::new(store, directory, clock, config.clone());

        Self {
            config,
            tracking,
            reports,
        }
    }

    /// Router with every analytics endpoint mounted.
    pub fn router(self: Arc<Self>) -> axum::Router {
        api::create_routes(self)
    }
}
