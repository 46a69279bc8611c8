//! Event Store
//!
//! Append-only log of visitor events. Every aggregate is computed from what
//! this log returns; nothing here deduplicates.

mod memory;
mod postgres;

pub use memory::InMemoryEventStore;
pub use postgres::PgEventStore;

use crate::models::{AggregationWindow, AnalyticsEvent, NewAnalyticsEvent};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt event row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Event store error: {:?}", err);
        StoreError::Database(err.to_string())
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event and return it with its assigned id.
    async fn append(&self, event: NewAnalyticsEvent) -> Result<AnalyticsEvent, StoreError>;

    /// All events of `business_id` whose `created_at` falls inside the
    /// window, in insertion order.
    async fn events_in_window(
        &self,
        business_id: i64,
        window: &AggregationWindow,
    ) -> Result<Vec<AnalyticsEvent>, StoreError>;
}
