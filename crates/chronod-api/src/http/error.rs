//! HTTP error mapping for the dashboard API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced to dashboard clients.
#[derive(Debug)]
pub enum ApiError {
    /// Unknown job id.
    JobNotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::JobNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Job '{id}' not found"))
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
