//! Event Emitter
//!
//! Client-side tracker: sends each (event type, business, product) at most once
//! per session, and only remembers a key after the server accepted it.

use super::identity::VisitorIdentity;
use crate::models::EventType;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Path of the ingestion endpoint relative to the storefront origin.
pub const TRACK_PATH: &str = "/api/analytics/track";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackPayload {
    pub business_id: i64,
    pub event_type: EventType,
    pub product_id: Option<i64>,
    pub visitor_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Server rejected event with status {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn submit(&self, payload: &TrackPayload) -> Result<(), TransportError>;
}

/// Posts events as JSON to a storefront's ingestion endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), TRACK_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn submit(&self, payload: &TrackPayload) -> Result<(), TransportError> {
        let response = self.client.post(&self.endpoint).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

// ============================================
// Session Dedup
// ============================================

/// Keys already delivered in the current session.
///
/// Checking and marking are separate steps around the network call, so two
/// concurrent calls for one key may both submit.
#[derive(Debug, Default)]
pub struct SessionDedup {
    sent: Mutex<HashSet<String>>,
}

impl SessionDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(event_type: EventType, business_id: i64, product_id: Option<i64>) -> String {
        match product_id {
            Some(id) => format!("{}_{}_{}", event_type, business_id, id),
            None => format!("{}_{}_null", event_type, business_id),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn mark_sent(&self, key: String) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything, as a page reload would.
    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

// ============================================
// Emitter
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Sent,
    AlreadySent,
}

/// The page being viewed, for automatic page-view tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageView {
    Store,
    Product(i64),
}

pub struct EventEmitter {
    transport: Arc<dyn EventTransport>,
    identity: VisitorIdentity,
    dedup: Arc<SessionDedup>,
}

impl EventEmitter {
    pub fn new(transport: Arc<dyn EventTransport>, identity: VisitorIdentity) -> Self {
        Self::with_dedup(transport, identity, Arc::new(SessionDedup::new()))
    }

    pub fn with_dedup(
        transport: Arc<dyn EventTransport>,
        identity: VisitorIdentity,
        dedup: Arc<SessionDedup>,
    ) -> Self {
        Self {
            transport,
            identity,
            dedup,
        }
    }

    pub fn dedup(&self) -> &SessionDedup {
        &self.dedup
    }

    /// Submit an event unless the same one already went out this session.
    /// On failure the key stays unmarked so a later call can retry.
    pub async fn track(
        &self,
        business_id: i64,
        event_type: EventType,
        product_id: Option<i64>,
    ) -> Result<EmitOutcome, TransportError> {
        let key = SessionDedup::key(event_type, business_id, product_id);

        if self.dedup.contains(&key) {
            tracing::debug!(key = %key, "Event already sent this session");
            return Ok(EmitOutcome::AlreadySent);
        }

        let payload = TrackPayload {
            business_id,
            event_type,
            product_id,
            visitor_id: self.identity.get_or_create_visitor_id(),
        };

        if let Err(e) = self.transport.submit(&payload).await {
            tracing::warn!(key = %key, "Analytics tracking error: {}", e);
            return Err(e);
        }

        self.dedup.mark_sent(key);
        Ok(EmitOutcome::Sent)
    }

    /// Track the page a visitor just opened.
    pub async fn track_page_view(
        &self,
        business_id: i64,
        page: PageView,
    ) -> Result<EmitOutcome, TransportError> {
        match page {
            PageView::Store => self.track(business_id, EventType::StoreVisited, None).await,
            PageView::Product(id) => {
                self.track(business_id, EventType::ProductViewed, Some(id))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::identity::MemoryStorage;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<TrackPayload>>,
        failing: AtomicBool,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<TrackPayload> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventTransport for RecordingTransport {
        async fn submit(&self, payload: &TrackPayload) -> Result<(), TransportError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::Request("connection refused".into()));
            }
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn emitter(transport: Arc<RecordingTransport>) -> EventEmitter {
        EventEmitter::new(transport, VisitorIdentity::new(Arc::new(MemoryStorage::new())))
    }

    #[test]
    fn test_dedup_key_format() {
        assert_eq!(
            SessionDedup::key(EventType::StoreVisited, 1, None),
            "store_visited_1_null"
        );
        assert_eq!(
            SessionDedup::key(EventType::ProductViewed, 1, Some(10)),
            "product_viewed_1_10"
        );
    }

    #[tokio::test]
    async fn test_identical_events_sent_once_per_session() {
        let transport = Arc::new(RecordingTransport::default());
        let emitter = emitter(transport.clone());

        let first = emitter.track(1, EventType::ProductViewed, Some(10)).await.unwrap();
        let second = emitter.track(1, EventType::ProductViewed, Some(10)).await.unwrap();

        assert_eq!(first, EmitOutcome::Sent);
        assert_eq!(second, EmitOutcome::AlreadySent);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_are_sent_separately() {
        let transport = Arc::new(RecordingTransport::default());
        let emitter = emitter(transport.clone());

        emitter.track(1, EventType::ProductViewed, Some(10)).await.unwrap();
        emitter.track(1, EventType::ProductViewed, Some(20)).await.unwrap();
        emitter.track(1, EventType::InquirySent, Some(10)).await.unwrap();
        emitter.track(2, EventType::ProductViewed, Some(10)).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        // one visitor id for the whole session
        assert!(sent.iter().all(|p| p.visitor_id == sent[0].visitor_id));
    }

    #[tokio::test]
    async fn test_failed_submission_can_be_retried() {
        let transport = Arc::new(RecordingTransport::default());
        let emitter = emitter(transport.clone());

        transport.failing.store(true, Ordering::SeqCst);
        assert!(emitter.track(1, EventType::StoreVisited, None).await.is_err());
        assert!(emitter.dedup().is_empty());

        transport.failing.store(false, Ordering::SeqCst);
        let outcome = emitter.track(1, EventType::StoreVisited, None).await.unwrap();
        assert_eq!(outcome, EmitOutcome::Sent);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_new_session_sends_again() {
        let transport = Arc::new(RecordingTransport::default());
        let emitter = emitter(transport.clone());

        emitter.track_page_view(1, PageView::Store).await.unwrap();
        emitter.dedup().clear();
        emitter.track_page_view(1, PageView::Store).await.unwrap();

        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_page_view_maps_to_event_type() {
        let transport = Arc::new(RecordingTransport::default());
        let emitter = emitter(transport.clone());

        emitter.track_page_view(5, PageView::Store).await.unwrap();
        emitter.track_page_view(5, PageView::Product(42)).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].event_type, EventType::StoreVisited);
        assert_eq!(sent[0].product_id, None);
        assert_eq!(sent[1].event_type, EventType::ProductViewed);
        assert_eq!(sent[1].product_id, Some(42));
    }

    #[test]
    fn test_payload_wire_format() {
        let payload = TrackPayload {
            business_id: 1,
            event_type: EventType::InquirySent,
            product_id: None,
            visitor_id: "visitor_1".into(),
        };

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({
                "business_id": 1,
                "event_type": "inquiry_sent",
                "product_id": null,
                "visitor_id": "visitor_1"
            })
        );
    }

    #[test]
    fn test_http_transport_endpoint() {
        let transport = HttpTransport::new("https://shop.example/");
        assert_eq!(transport.endpoint(), "https://shop.example/api/analytics/track");
    }
}
