//! Analytics REST API Handlers

use crate::error::ApiError;
use crate::extractors::AuthenticatedBusiness;
use crate::models::*;
use crate::services::{RequestMeta, TrackOutcome};
use crate::AnalyticsApp;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create API routes
pub fn create_routes(app: Arc<AnalyticsApp>) -> Router {
    // Storefront pages may live on another origin than the API.
    let public = Router::new()
        .route("/api/analytics/track", post(track_event))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/api/analytics/dashboard", get(get_dashboard))
        .route("/api/analytics/export", get(export_daily_trends))
        .route("/health", get(health))
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

// ============================================
// Tracking Endpoint
// ============================================

/// POST /api/analytics/track
pub async fn track_event(
    State(app): State<Arc<AnalyticsApp>>,
    meta: RequestMeta,
    payload: Result<Json<TrackEventRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = payload.map_err(|e| ApiError::field("body", e.body_text()))?;

    match app.tracking.track(&input, &meta).await {
        Ok(TrackOutcome::Recorded(_)) => Ok(Json(serde_json::json!({ "success": true }))),
        Ok(TrackOutcome::Disabled) => Ok(Json(serde_json::json!({
            "success": true,
            "tracked": false
        }))),
        Err(e) => {
            let err = ApiError::from(e);
            match &err {
                ApiError::Validation(fields) => {
                    tracing::warn!(?fields, "Rejected analytics event");
                }
                other => {
                    tracing::error!("Tracking error: {:?}", other);
                }
            }
            Err(err)
        }
    }
}

// ============================================
// Dashboard Endpoints
// ============================================

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub analytics: AnalyticsSnapshot,
    pub date_range: u32,
}

fn date_range(
    app: &AnalyticsApp,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<(u32, AggregationWindow), ApiError> {
    let Query(query) = query.map_err(|e| ApiError::field("date_range", e.body_text()))?;
    let days = query.date_range.unwrap_or(app.config.default_date_range);
    let window = app.reports.window_for(Some(days))?;
    Ok((days, window))
}

/// GET /api/analytics/dashboard
pub async fn get_dashboard(
    State(app): State<Arc<AnalyticsApp>>,
    business: AuthenticatedBusiness,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let (days, window) = date_range(&app, query)?;

    let analytics = app
        .reports
        .snapshot(business.business_id, &window)
        .await
        .map_err(|e| {
            tracing::error!("Failed to build dashboard: {:?}", e);
            ApiError::from(e)
        })?;

    Ok(Json(DashboardResponse {
        analytics,
        date_range: days,
    }))
}

/// GET /api/analytics/export
pub async fn export_daily_trends(
    State(app): State<Arc<AnalyticsApp>>,
    business: AuthenticatedBusiness,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, window) = date_range(&app, query)?;

    let csv = app
        .reports
        .export_daily_trends_csv(business.business_id, &window)
        .await
        .map_err(|e| {
            tracing::error!("Failed to export daily trends: {:?}", e);
            ApiError::from(e)
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"daily-trends.csv\"",
            ),
        ],
        csv,
    ))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::AnalyticsConfig;
    use crate::directory::{InMemoryDirectory, ProductSummary};
    use crate::extractors::VendorClaims;
    use crate::store::InMemoryEventStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct TestApp {
        store: Arc<InMemoryEventStore>,
        router: Router,
    }

    async fn test_app() -> TestApp {
        let store = Arc::new(InMemoryEventStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_business(1).await;
        directory.add_business(2).await;
        for (id, name) in [(10, "Linen Shirt"), (20, "Canvas Tote")] {
            directory
                .add_product(ProductSummary {
                    id,
                    name: name.into(),
                    image: None,
                })
                .await;
        }

        let config = AnalyticsConfig {
            jwt_secret: Some(SECRET.into()),
            ..AnalyticsConfig::default()
        };
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 11, 30, 12, 0, 0).unwrap(),
        ));

        let app = Arc::new(AnalyticsApp::new(config, store.clone(), directory, clock));
        TestApp {
            store,
            router: app.router(),
        }
    }

    fn token(business_id: i64) -> String {
        let claims = VendorClaims {
            sub: "vendor-1".into(),
            business_id,
            exp: 4_102_444_800,
            iss: "storefront".into(),
            aud: "storefront-analytics".into(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn track(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analytics/track")
            .header("content-type", "application/json")
            .header("user-agent", "Mozilla/5.0 (Linux; Android 14) Mobile")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn dashboard(business_id: i64, query: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/api/analytics/dashboard{}", query))
            .header("authorization", format!("Bearer {}", token(business_id)))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_visit_shows_on_dashboard() {
        let app = test_app().await;

        let (status, body) = send(
            &app.router,
            track(serde_json::json!({
                "business_id": 1,
                "event_type": "store_visited",
                "visitor_id": "visitor_1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "success": true }));

        let (status, body) = send(&app.router, dashboard(1, "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overview"]["store_visits"], 1);
        assert_eq!(body["overview"]["unique_visitors"], 1);
        assert_eq!(body["daily_trends"]["2025-11-30"]["store_visits"], 1);
        assert_eq!(body["date_range"], 30);
        assert_eq!(body["conversion_rate"], 0.0);
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_rejected() {
        let app = test_app().await;

        let (status, body) = send(
            &app.router,
            track(serde_json::json!({
                "business_id": 1,
                "event_type": "unknown_type",
                "visitor_id": "visitor_1"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
        assert!(body["errors"]["event_type"].is_array());
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_fields_and_bad_types_are_rejected() {
        let app = test_app().await;

        let (status, body) = send(&app.router, track(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["business_id"].is_array());
        assert!(body["errors"]["visitor_id"].is_array());

        let (status, body) = send(
            &app.router,
            track(serde_json::json!({
                "business_id": "one",
                "event_type": "store_visited",
                "visitor_id": "visitor_1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["body"].is_array());

        let (status, _) = send(
            &app.router,
            track(serde_json::json!({
                "business_id": 1,
                "event_type": "product_viewed",
                "product_id": 999,
                "visitor_id": "visitor_1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_product_funnel_on_dashboard() {
        let app = test_app().await;
        let event = |kind: &str, product: i64, visitor: &str| {
            track(serde_json::json!({
                "business_id": 1,
                "event_type": kind,
                "product_id": product,
                "visitor_id": visitor
            }))
        };

        for _ in 0..10 {
            send(&app.router, event("product_viewed", 10, "v1")).await;
        }
        for _ in 0..3 {
            send(&app.router, event("inquiry_sent", 10, "v1")).await;
        }
        for _ in 0..5 {
            send(&app.router, event("product_viewed", 20, "v2")).await;
        }

        let (status, body) = send(&app.router, dashboard(1, "?date_range=7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date_range"], 7);
        assert_eq!(body["overview"]["product_views"], 15);
        assert_eq!(body["overview"]["unique_visitors"], 2);
        assert_eq!(body["top_products"][0]["id"], 10);
        assert_eq!(body["top_products"][0]["conversion_rate"], 30.0);
        assert_eq!(body["top_products"][1]["id"], 20);
        assert_eq!(body["top_products"][1]["conversion_rate"], 0.0);
        assert_eq!(body["conversion_rate"], 20.0);

        let events = app.store.all().await;
        assert!(events.iter().all(|e| e.device_type == DeviceType::Mobile));
    }

    #[tokio::test]
    async fn test_dashboard_is_scoped_to_token_business() {
        let app = test_app().await;
        send(
            &app.router,
            track(serde_json::json!({
                "business_id": 1,
                "event_type": "store_visited",
                "visitor_id": "visitor_1"
            })),
        )
        .await;

        let (status, body) = send(&app.router, dashboard(2, "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overview"]["store_visits"], 0);
        assert_eq!(body["daily_trends"], serde_json::json!({}));
        assert_eq!(body["top_products"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_dashboard_requires_valid_token() {
        let app = test_app().await;

        let request = Request::builder()
            .uri("/api/analytics/dashboard")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/api/analytics/dashboard")
            .header("authorization", "Bearer not-a-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_dashboard_rejects_oversized_range() {
        let app = test_app().await;

        let (status, body) = send(&app.router, dashboard(1, "?date_range=1000")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["date_range"].is_array());

        let (status, _) = send(&app.router, dashboard(1, "?date_range=abc")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_export_returns_csv() {
        let app = test_app().await;
        send(
            &app.router,
            track(serde_json::json!({
                "business_id": 1,
                "event_type": "store_visited",
                "visitor_id": "visitor_1"
            })),
        )
        .await;

        let request = Request::builder()
            .uri("/api/analytics/export")
            .header("authorization", format!("Bearer {}", token(1)))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/csv; charset=utf-8"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "date,store_visits,product_views,inquiries\n2025-11-30,1,0,0\n"
        );
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
