//! Per-session engagement endpoints: rating and bookmark toggle.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::services::engagement::{self, RatingSummary};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: i64,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub bookmarked: bool,
}

/// POST /api/sessions/{id}/rate
pub async fn rate_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RateRequest>,
) -> ApiResult<Json<RatingSummary>> {
    let summary =
        engagement::rate_session(&state.db, user.user_id, session_id, request.rating).await?;
    Ok(Json(summary))
}

/// POST /api/sessions/{id}/bookmarks/toggle
pub async fn toggle_bookmark(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ToggleResponse>> {
    let bookmarked = engagement::toggle_bookmark(&state.db, user.user_id, session_id).await?;
    Ok(Json(ToggleResponse { bookmarked }))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions/:id/rate", post(rate_session))
        .route("/api/sessions/:id/bookmarks/toggle", post(toggle_bookmark))
}
