//! Bearer-token authentication.
//!
//! Tokens are long-lived HS256 JWTs carrying only the anonymous user id.
//! The extractor verifies the signature and that the user row still exists,
//! so a wiped database invalidates all outstanding tokens.

use crate::{db, AppState, Error, Result};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token lifetime: two years.
const TOKEN_LIFETIME_DAYS: i64 = 730;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id_user: Uuid,
    exp: i64,
}

/// Issue a signed token for `user_id`.
pub fn issue_token(secret: &str, user_id: Uuid) -> Result<String> {
    let claims = Claims {
        id_user: user_id,
        exp: (Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Failed to sign token: {e}")))
}

/// Verify a token and return the embedded user id.
pub fn verify_token(secret: &str, token: &str) -> Result<Uuid> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| Error::Unauthorized(format!("Invalid token: {e}")))?;
    Ok(data.claims.id_user)
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("Missing Authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("Expected Bearer token".to_string()))?;

        let user_id = verify_token(&state.config.jwt_secret, token)?;

        if db::users::find_user(&state.db, user_id).await?.is_none() {
            return Err(Error::Unauthorized("Unknown user".to_string()));
        }

        Ok(AuthUser { user_id })
    }
}
