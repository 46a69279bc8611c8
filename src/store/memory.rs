use super::{EventStore, StoreError};
use crate::models::{AggregationWindow, AnalyticsEvent, NewAnalyticsEvent};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Event log held in process memory. Ids start at 1.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<AnalyticsEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<AnalyticsEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewAnalyticsEvent) -> Result<AnalyticsEvent, StoreError> {
        let mut events = self.events.write().await;
        let id = events.len() as i64 + 1;
        let stored = event.into_event(id);
        events.push(stored.clone());
        Ok(stored)
    }

    async fn events_in_window(
        &self,
        business_id: i64,
        window: &AggregationWindow,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.business_id == business_id && window.contains(e.created_at))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceType, EventType};
    use chrono::{Duration, TimeZone, Utc};

    fn event(business_id: i64, at: chrono::DateTime<Utc>) -> NewAnalyticsEvent {
        NewAnalyticsEvent {
            business_id,
            product_id: None,
            event_type: EventType::StoreVisited,
            visitor_id: "visitor_1".into(),
            device_type: DeviceType::Desktop,
            referrer: None,
            ip_address: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let store = InMemoryEventStore::new();
        let at = Utc.with_ymd_and_hms(2025, 11, 2, 10, 0, 0).unwrap();

        let first = store.append(event(1, at)).await.unwrap();
        let second = store.append(event(1, at)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_window_filters_business_and_time() {
        let store = InMemoryEventStore::new();
        let now = Utc.with_ymd_and_hms(2025, 11, 30, 12, 0, 0).unwrap();
        let window = AggregationWindow::last_days(now, 7).unwrap();

        store.append(event(1, now)).await.unwrap();
        store.append(event(1, now - Duration::days(8))).await.unwrap();
        store.append(event(2, now)).await.unwrap();
        store.append(event(1, window.start)).await.unwrap();

        let found = store.events_in_window(1, &window).await.unwrap();
        let ids: Vec<i64> = found.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }
}
