//! opencon - Conference companion backend
//!
//! Imports conference schedules from XML, reconciles them against the
//! relational store, pushes reschedule notifications, and serves the
//! incremental-sync API consumed by the mobile apps.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opencon::services::notifier::{self, NotificationQueue};
use opencon::{AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting opencon backend");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("Database: {}", config.database_path.display());

    let db_pool = opencon::db::init_database_pool(&config.database_path).await?;
    opencon::db::init_tables(&db_pool).await?;
    info!("Database connection established");

    let (queue, rx) = NotificationQueue::new(config.notification_queue_capacity);
    notifier::spawn_delivery_worker(rx, config.push_gateway_url.clone());
    match &config.push_gateway_url {
        Some(url) => info!("Push gateway: {url}"),
        None => info!("Push gateway not configured; notifications will be logged and dropped"),
    }

    let bind_address = config.bind_address.clone();
    let state = AppState::new(db_pool, config, queue);
    let app = opencon::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{bind_address}");
    info!("Health check: http://{bind_address}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
