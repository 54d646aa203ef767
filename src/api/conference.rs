//! Incremental-sync endpoint for the mobile client.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db;
use crate::services::snapshot::{self, SyncPayload};
use crate::{ApiResult, AppState, Error};

#[derive(Debug, Deserialize)]
pub struct ConferenceParams {
    /// Client's freshness token from a previous payload.
    pub last_updated: Option<String>,
}

/// GET /api/conference
///
/// Returns the sync payload for the most recently created conference.
pub async fn get_conference(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ConferenceParams>,
) -> ApiResult<Json<SyncPayload>> {
    let conference = db::conferences::current(&state.db)
        .await?
        .ok_or_else(|| Error::NotFound("no conference imported".to_string()))?;

    let payload = snapshot::build_snapshot(
        &state.db,
        user.user_id,
        &conference,
        params.last_updated.as_deref(),
        state.config.sponsors_file.as_deref(),
    )
    .await?;

    Ok(Json(payload))
}

/// Build conference routes
pub fn conference_routes() -> Router<AppState> {
    Router::new().route("/api/conference", get(get_conference))
}
