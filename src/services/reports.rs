use super::ReportError;
use crate::clock::Clock;
use crate::config::AnalyticsConfig;
use crate::directory::{CatalogDirectory, ProductSummary};
use crate::models::*;
use crate::store::EventStore;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Entries in the top-products listing.
pub const TOP_PRODUCTS_LIMIT: usize = 5;

// ============================================
// Report Service
// ============================================

pub struct ReportService {
    store: Arc<dyn EventStore>,
    directory: Arc<dyn CatalogDirectory>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn EventStore>,
        directory: Arc<dyn CatalogDirectory>,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            config,
        }
    }

    /// Resolve a requested range in days into `[now - days, now]`.
    pub fn window_for(&self, date_range: Option<u32>) -> Result<AggregationWindow, ReportError> {
        let days = date_range.unwrap_or(self.config.default_date_range);

        if days > self.config.max_date_range {
            return Err(ReportError::InvalidRange(format!(
                "date_range may not exceed {} days",
                self.config.max_date_range
            )));
        }

        AggregationWindow::last_days(self.clock.now(), days).ok_or_else(|| {
            ReportError::InvalidRange(format!("date_range of {} days is out of range", days))
        })
    }

    /// Build the dashboard snapshot for one business. A business without
    /// events, or one that does not exist, yields an empty snapshot.
    pub async fn snapshot(
        &self,
        business_id: i64,
        window: &AggregationWindow,
    ) -> Result<AnalyticsSnapshot, ReportError> {
        let events = self.store.events_in_window(business_id, window).await?;

        let overview = overview(&events);
        let conversion_rate = conversion_rate(overview.inquiries, overview.product_views);
        let top_products = self.top_products(&events).await?;

        tracing::debug!(
            business_id,
            events = events.len(),
            top_products = top_products.len(),
            "Analytics snapshot computed"
        );

        Ok(AnalyticsSnapshot {
            overview,
            daily_trends: daily_trends(&events),
            top_products,
            conversion_rate,
        })
    }

    /// Daily trends as CSV, one row per active day.
    pub async fn export_daily_trends_csv(
        &self,
        business_id: i64,
        window: &AggregationWindow,
    ) -> Result<String, ReportError> {
        let events = self.store.events_in_window(business_id, window).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["date", "store_visits", "product_views", "inquiries"])
            .map_err(|e| ReportError::Export(e.to_string()))?;

        for (date, trend) in daily_trends(&events) {
            writer
                .write_record([
                    date.to_string(),
                    trend.store_visits.to_string(),
                    trend.product_views.to_string(),
                    trend.inquiries.to_string(),
                ])
                .map_err(|e| ReportError::Export(e.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ReportError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ReportError::Export(e.to_string()))
    }

    async fn top_products(&self, events: &[AnalyticsEvent]) -> Result<Vec<TopProduct>, ReportError> {
        let counts = product_counts(events);
        if counts.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = counts.keys().copied().collect();
        let summaries: HashMap<i64, ProductSummary> = self
            .directory
            .product_summaries(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        // Candidates are visited in ascending id order, so the stable sort
        // below breaks view-count ties by id.
        let mut ranked: Vec<TopProduct> = counts
            .into_iter()
            .filter_map(|(id, c)| {
                let summary = summaries.get(&id)?;
                Some(TopProduct {
                    id,
                    name: summary.name.clone(),
                    image: summary.image.clone(),
                    views: c.views,
                    inquiries: c.inquiries,
                    conversion_rate: conversion_rate(c.inquiries, c.views),
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.views.cmp(&a.views));
        ranked.truncate(TOP_PRODUCTS_LIMIT);
        Ok(ranked)
    }
}

// ============================================
// Aggregation
// ============================================

/// Per-product view and inquiry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductCounts {
    pub views: i64,
    pub inquiries: i64,
}

pub fn overview(events: &[AnalyticsEvent]) -> Overview {
    let mut overview = Overview::default();
    let mut visitors: HashSet<&str> = HashSet::new();

    for event in events {
        match event.event_type {
            EventType::StoreVisited => overview.store_visits += 1,
            EventType::ProductViewed => overview.product_views += 1,
            EventType::InquirySent => overview.inquiries += 1,
            EventType::ProductShared => overview.shares += 1,
        }
        visitors.insert(event.visitor_id.as_str());
    }

    overview.unique_visitors = visitors.len() as i64;
    overview
}

/// Visits, views and inquiries per UTC calendar day of `created_at`.
/// Days with none of the three are left out.
pub fn daily_trends(events: &[AnalyticsEvent]) -> BTreeMap<NaiveDate, DailyTrend> {
    let mut trends: BTreeMap<NaiveDate, DailyTrend> = BTreeMap::new();

    for event in events {
        let day = event.created_at.date_naive();
        match event.event_type {
            EventType::StoreVisited => trends.entry(day).or_default().store_visits += 1,
            EventType::ProductViewed => trends.entry(day).or_default().product_views += 1,
            EventType::InquirySent => trends.entry(day).or_default().inquiries += 1,
            EventType::ProductShared => {}
        }
    }

    trends
}

/// Views and inquiries for every product with at least one of either.
pub fn product_counts(events: &[AnalyticsEvent]) -> BTreeMap<i64, ProductCounts> {
    let mut counts: BTreeMap<i64, ProductCounts> = BTreeMap::new();

    for event in events {
        let Some(product_id) = event.product_id else {
            continue;
        };
        match event.event_type {
            EventType::ProductViewed => counts.entry(product_id).or_default().views += 1,
            EventType::InquirySent => counts.entry(product_id).or_default().inquiries += 1,
            EventType::StoreVisited | EventType::ProductShared => {}
        }
    }

    counts
}

/// `inquiries / views` as a percentage rounded to one decimal, or 0 without views.
pub fn conversion_rate(inquiries: i64, views: i64) -> f64 {
    if views <= 0 {
        return 0.0;
    }
    let pct = inquiries as f64 / views as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}
