//! Crate-level error types for the HTTP surface.
//!
//! WebSocket-side failures never travel through these types; the channel
//! protocol reports problems to the peer as `text` messages and keeps the
//! connection open. `AppError` only covers the plain HTTP endpoints.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::core::detect::DetectorError;

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("detection failed: {0}")]
    Detection(#[from] DetectorError),

    #[error("storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Detection(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
