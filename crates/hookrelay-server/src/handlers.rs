//! Request handlers for the relay endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use hookrelay_core::{AcceptOutcome, CoordinatorStats, DeliveryClient};
use hookrelay_types::{Event, WebhookPayload};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::state::AppState;

/// `GET /healthz` -- liveness probe.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `POST /log` -- accept one webhook payload into the current batch.
///
/// The body must be a JSON object that decodes as a [`WebhookPayload`].
/// Malformed bodies are rejected with `400` and nothing is buffered. The
/// accepted JSON is buffered as received.
///
/// # Errors
///
/// Returns [`RelayError::InvalidPayload`] when the body does not decode.
pub async fn log_event<D: DeliveryClient>(
    State(state): State<Arc<AppState<D>>>,
    body: Bytes,
) -> Result<StatusCode, RelayError> {
    let value = serde_json::from_slice::<Value>(&body)
        .and_then(|value| WebhookPayload::from_json(&value).map(|payload| (payload, value)));
    let (payload, value) = value.map_err(|e| {
        warn!(error = %e, bytes = body.len(), "Failed to decode JSON payload");
        RelayError::InvalidPayload(e.to_string())
    })?;

    let event = Event::new(value);
    let event_id = event.id;

    match state.coordinator.accept(event).await {
        AcceptOutcome::Buffered => debug!(%event_id, user_id = payload.user_id, "Event buffered"),
        AcceptOutcome::Flushed {
            batch_id,
            batch_size,
        } => debug!(
            %event_id,
            user_id = payload.user_id,
            %batch_id,
            batch_size,
            "Event completed a batch"
        ),
    }

    Ok(StatusCode::OK)
}

/// `GET /stats` -- counters from the batching engine.
pub async fn stats<D: DeliveryClient>(
    State(state): State<Arc<AppState<D>>>,
) -> Json<CoordinatorStats> {
    Json(state.coordinator.stats().await)
}
