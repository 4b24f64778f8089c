// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::engine::validate::Violation;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (inactive exam, wrong password, wrong owner)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., a save racing a submit on the same attempt)
    Conflict(String),

    // 410 Gone: the attempt deadline passed. Distinct from Conflict so a
    // client can tell "too slow" apart from "two tabs fought".
    Expired(String),

    // 422 Unprocessable: matrix/assembly validation failed, with the
    // structured violation list.
    ValidationFailed(Vec<Violation>),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Internal Server Error"})),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, Json(json!({"error": msg}))),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, Json(json!({"error": msg}))),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Json(json!({"error": msg}))),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, Json(json!({"error": msg}))),
            AppError::Expired(msg) => (StatusCode::GONE, Json(json!({"error": msg}))),
            AppError::ValidationFailed(violations) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "Validation failed",
                    "violations": violations,
                })),
            ),
        };

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
