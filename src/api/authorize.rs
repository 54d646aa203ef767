//! Identity endpoints: anonymous registration and push-token upkeep.
//!
//! There is no account system; every authorize call without a token mints
//! a fresh anonymous user and hands back a long-lived JWT. Clients persist
//! the token and present it as a Bearer header on all other endpoints.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AuthUser};
use crate::services::engagement;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub push_notification_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationTokenRequest {
    pub push_notification_token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id_user: Uuid,
}

/// GET/POST /api/authorize
///
/// Register a fresh anonymous user and return its signed token. An
/// optional `push_notification_token` query lands on the new user row.
pub async fn authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let user_id =
        engagement::register_user(&state.db, params.push_notification_token.as_deref()).await?;
    let token = auth::issue_token(&state.config.jwt_secret, user_id)?;
    Ok(Json(AuthorizeResponse { token }))
}

/// POST /api/notification-token
///
/// Store or replace the caller's push token.
pub async fn set_notification_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<NotificationTokenRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    crate::db::users::set_push_token(
        &state.db,
        user.user_id,
        Some(request.push_notification_token.as_str()),
    )
    .await?;
    tracing::debug!(user_id = %user.user_id, "Push token updated");
    Ok(Json(serde_json::json!({})))
}

/// GET /api/me
///
/// Echo the verified identity; lets clients validate a stored token.
pub async fn me(user: AuthUser) -> ApiResult<Json<MeResponse>> {
    Ok(Json(MeResponse {
        id_user: user.user_id,
    }))
}

/// Build identity routes
pub fn authorize_routes() -> Router<AppState> {
    Router::new()
        .route("/api/authorize", get(authorize).post(authorize))
        .route("/api/notification-token", post(set_notification_token))
        .route("/api/me", get(me))
}
