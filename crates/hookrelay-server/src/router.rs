//! Axum router construction for the relay.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use hookrelay_core::DeliveryClient;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers;
use crate::state::AppState;

/// Build the relay router.
///
/// - `GET /healthz` -- liveness probe
/// - `POST /log` -- webhook ingestion
/// - `GET /stats` -- batching counters
///
/// Every request is traced at INFO with its latency in milliseconds.
pub fn build_router<D: DeliveryClient>(state: Arc<AppState<D>>) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/log", post(handlers::log_event::<D>))
        .route("/stats", get(handlers::stats::<D>))
        .layer(trace)
        .with_state(state)
}
