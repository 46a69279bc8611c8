use super::{EventStore, StoreError};
use crate::models::{AggregationWindow, AnalyticsEvent, DeviceType, EventType, NewAnalyticsEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// `analytics_events` table, created by the embedded migrations.
pub struct PgEventStore {
    db: PgPool,
}

impl PgEventStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    business_id: i64,
    product_id: Option<i64>,
    event_type: String,
    visitor_id: String,
    device_type: Option<String>,
    referrer: Option<String>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for AnalyticsEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type = row
            .event_type
            .parse::<EventType>()
            .map_err(|e| StoreError::Corrupt {
                id: row.id,
                reason: e.to_string(),
            })?;

        let device_type = match row.device_type.as_deref() {
            Some(raw) => raw
                .parse::<DeviceType>()
                .map_err(|reason| StoreError::Corrupt { id: row.id, reason })?,
            None => DeviceType::Desktop,
        };

        Ok(AnalyticsEvent {
            id: row.id,
            business_id: row.business_id,
            product_id: row.product_id,
            event_type,
            visitor_id: row.visitor_id,
            device_type,
            referrer: row.referrer,
            ip_address: row.ip_address,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewAnalyticsEvent) -> Result<AnalyticsEvent, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO analytics_events
            (business_id, product_id, event_type, visitor_id, device_type, referrer, ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(event.business_id)
        .bind(event.product_id)
        .bind(event.event_type.as_str())
        .bind(&event.visitor_id)
        .bind(event.device_type.as_str())
        .bind(&event.referrer)
        .bind(&event.ip_address)
        .bind(event.created_at)
        .fetch_one(&self.db)
        .await?;

        Ok(event.into_event(id))
    }

    async fn events_in_window(
        &self,
        business_id: i64,
        window: &AggregationWindow,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, business_id, product_id, event_type, visitor_id,
                   device_type, referrer, ip_address, created_at
            FROM analytics_events
            WHERE business_id = $1 AND created_at BETWEEN $2 AND $3
            ORDER BY id ASC
            "#,
        )
        .bind(business_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(AnalyticsEvent::try_from).collect()
    }
}
