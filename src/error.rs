//! Error types for opencon
//!
//! One taxonomy shared by the import pipeline, the engagement store and the
//! HTTP layer. Handlers return `ApiResult<T>`; `IntoResponse` maps each
//! variant to a status code and a stable machine-readable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for opencon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed source document (aborts the import)
    #[error("Schedule parse error: {0}")]
    Parse(String),

    /// Same unique id seen twice within one import pass (aborts the import)
    #[error("Event {0} already exists")]
    DuplicateEvent(String),

    /// Structurally invalid schedule content (missing day date, room name)
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
    },

    /// Missing required external source configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// User/session/conference missing (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate value outside 1..=5
    #[error("rate not valid, use number between 1 and 5")]
    InvalidRate,

    /// Session is flagged not rateable
    #[error("session is not rateable")]
    NotRateable,

    /// Rating attempted before the session started
    #[error("Rating is only possible after the talk has started.")]
    TooEarly,

    /// Bad/expired/orphaned identity token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Error::Parse(ref msg) => (
                StatusCode::NOT_ACCEPTABLE,
                "SCHEDULE_NOT_VALID",
                msg.clone(),
            ),
            Error::DuplicateEvent(_) => (
                StatusCode::NOT_ACCEPTABLE,
                "EVENT_UNIQUE_ID_ALREADY_EXISTS",
                self.to_string(),
            ),
            Error::Validation { code, ref message } => {
                (StatusCode::NOT_ACCEPTABLE, code, message.clone())
            }
            Error::Config(ref msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::NotFound(ref msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::InvalidRate => (
                StatusCode::NOT_ACCEPTABLE,
                "RATE_NOT_VALID",
                self.to_string(),
            ),
            Error::NotRateable => (
                StatusCode::NOT_ACCEPTABLE,
                "SESSION_IS_NOT_RATEABLE",
                self.to_string(),
            ),
            Error::TooEarly => (
                StatusCode::NOT_ACCEPTABLE,
                "CAN_NOT_RATE_SESSION_IN_FUTURE",
                self.to_string(),
            ),
            Error::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            Error::Database(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                err.to_string(),
            ),
            Error::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            Error::Internal(ref msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
