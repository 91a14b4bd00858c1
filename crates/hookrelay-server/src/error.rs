//! Error types for the relay HTTP layer.
//!
//! [`RelayError`] maps ingestion failures onto HTTP responses through its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. The body
//! is always a JSON object with `error` and `status` fields.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors surfaced to webhook senders.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request body was not a valid webhook payload.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        let Self::InvalidPayload(message) = self;

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
