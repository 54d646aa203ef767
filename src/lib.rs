//! opencon library interface
//!
//! Conference companion backend: XML schedule import with reschedule
//! detection, push-notification fan-out, and an incremental-sync API for
//! anonymous mobile users.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod schedule;
pub mod services;

pub use crate::config::Config;
pub use crate::error::{ApiResult, Error, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use services::importer::ImportLocks;
use services::notifier::NotificationQueue;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Outbound push-notification queue handle
    pub notifier: NotificationQueue,
    /// Per-source import serialization locks
    pub import_locks: ImportLocks,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config, notifier: NotificationQueue) -> Self {
        Self {
            db,
            config: Arc::new(config),
            notifier,
            import_locks: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::authorize_routes())
        .merge(api::import_routes())
        .merge(api::conference_routes())
        .merge(api::session_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
