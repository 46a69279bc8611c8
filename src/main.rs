//! Storefront Analytics server
//!
//! Serves the tracking endpoint and vendor dashboard. Uses Postgres when
//! DATABASE_URL is set and an in-memory store otherwise.

use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use storefront_analytics::clock::SystemClock;
use storefront_analytics::config::AnalyticsConfig;
use storefront_analytics::directory::{CatalogDirectory, InMemoryDirectory, PgDirectory};
use storefront_analytics::store::{EventStore, InMemoryEventStore, PgEventStore};
use storefront_analytics::AnalyticsApp;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AnalyticsConfig::from_env();
    config.validate()?;

    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET is not set; dashboard requests will be refused");
    }

    let (store, directory): (Arc<dyn EventStore>, Arc<dyn CatalogDirectory>) =
        match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
                    .await?;

                let store = PgEventStore::new(pool.clone());
                store.migrate().await?;
                tracing::info!("Using Postgres event store");

                (Arc::new(store), Arc::new(PgDirectory::new(pool)))
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL is not set; events are kept in memory and the catalog is empty"
                );
                (
                    Arc::new(InMemoryEventStore::new()),
                    Arc::new(InMemoryDirectory::new()),
                )
            }
        };

    let bind_addr = config.bind_addr.clone();
    let app = Arc::new(AnalyticsApp::new(
        config,
        store,
        directory,
        Arc::new(SystemClock),
    ));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
