//! Analytics Data Models

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// Longest referrer kept on an event; longer values are truncated.
pub const MAX_REFERRER_LEN: usize = 255;

// ============================================
// Event Kinds
// ============================================

/// The closed set of visitor interactions that can be tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StoreVisited,
    ProductViewed,
    InquirySent,
    ProductShared,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::StoreVisited,
        EventType::ProductViewed,
        EventType::InquirySent,
        EventType::ProductShared,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StoreVisited => "store_visited",
            EventType::ProductViewed => "product_viewed",
            EventType::InquirySent => "inquiry_sent",
            EventType::ProductShared => "product_shared",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// Coarse device class inferred from a user agent string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    /// Keyword heuristic over the user agent. Mobile keywords win over tablet
    /// ones, so an agent mentioning both "android" and "tablet" is mobile.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();

        if ["mobile", "android", "iphone"].iter().any(|k| ua.contains(k)) {
            DeviceType::Mobile
        } else if ["tablet", "ipad"].iter().any(|k| ua.contains(k)) {
            DeviceType::Tablet
        } else {
            DeviceType::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(DeviceType::Mobile),
            "tablet" => Ok(DeviceType::Tablet),
            "desktop" => Ok(DeviceType::Desktop),
            other => Err(format!("Unknown device type: {}", other)),
        }
    }
}

// ============================================
// Stored Events
// ============================================

/// A recorded visitor interaction. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub business_id: i64,
    pub product_id: Option<i64>,
    pub event_type: EventType,
    pub visitor_id: String,
    pub device_type: DeviceType,
    pub referrer: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An event that has passed validation and is ready to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalyticsEvent {
    pub business_id: i64,
    pub product_id: Option<i64>,
    pub event_type: EventType,
    pub visitor_id: String,
    pub device_type: DeviceType,
    pub referrer: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewAnalyticsEvent {
    pub fn into_event(self, id: i64) -> AnalyticsEvent {
        AnalyticsEvent {
            id,
            business_id: self.business_id,
            product_id: self.product_id,
            event_type: self.event_type,
            visitor_id: self.visitor_id,
            device_type: self.device_type,
            referrer: self.referrer,
            ip_address: self.ip_address,
            created_at: self.created_at,
        }
    }
}

// ============================================
// Windows
// ============================================

/// Closed time interval used to slice one business's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AggregationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[now - days, now]`, or `None` when the start falls outside the
    /// representable date range.
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Option<Self> {
        let start = now.checked_sub_signed(Duration::days(i64::from(days)))?;
        Some(Self { start, end: now })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

// ============================================
// Snapshot
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub store_visits: i64,
    pub product_views: i64,
    pub inquiries: i64,
    pub shares: i64,
    pub unique_visitors: i64,
}

/// One day of activity. Shares are only reported in the overview.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub store_visits: i64,
    pub product_views: i64,
    pub inquiries: i64,
}

impl DailyTrend {
    pub fn is_empty(&self) -> bool {
        self.store_visits == 0 && self.product_views == 0 && self.inquiries == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopProduct {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub views: i64,
    pub inquiries: i64,
    pub conversion_rate: f64,
}

/// Dashboard payload for one business over one window.
///
/// `daily_trends` is sparse: days without visits, views or inquiries are
/// absent rather than zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub overview: Overview,
    pub daily_trends: BTreeMap<NaiveDate, DailyTrend>,
    pub top_products: Vec<TopProduct>,
    pub conversion_rate: f64,
}

// ============================================
// Request Inputs
// ============================================

/// Body of `POST /api/analytics/track`.
///
/// Every field is optional at the serde level so missing fields surface as
/// per-field validation errors instead of a generic body rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TrackEventRequest {
    #[validate(required(message = "The business_id field is required."))]
    pub business_id: Option<i64>,

    #[validate(
        required(message = "The event_type field is required."),
        custom(function = "validate_event_type")
    )]
    pub event_type: Option<String>,

    pub product_id: Option<i64>,

    #[validate(
        required(message = "The visitor_id field is required."),
        length(
            min = 1,
            max = 64,
            message = "The visitor_id field must be between 1 and 64 characters."
        )
    )]
    pub visitor_id: Option<String>,
}

fn validate_event_type(value: &str) -> Result<(), ValidationError> {
    match value.parse::<EventType>() {
        Ok(_) => Ok(()),
        Err(_) => {
            let mut err = ValidationError::new("event_type");
            err.message = Some("The selected event_type is invalid.".into());
            Err(err)
        }
    }
}

/// Query parameters for the dashboard and export endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub date_range: Option<u32>,
}
