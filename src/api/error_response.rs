//! §6 error response schema: `{error, message, request_id, details?}`.
//! Grounded on `other_examples/...porua__server-src-server.rs`'s
//! `Result<T>`/`IntoResponse` pattern, adapted to the spec's fixed body
//! shape instead of a free-form error enum.

use crate::error::AppError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &self {
            AppError::Validation { code, .. } => Some(serde_json::json!({ "code": code })),
            AppError::CircuitOpen { retry_after_secs, .. } => {
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs }))
            }
            _ => None,
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            request_id: Uuid::new_v4().to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}
