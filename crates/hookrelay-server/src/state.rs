//! Shared state handed to every request handler.

use hookrelay_core::{BatchCoordinator, DeliveryClient};

/// Application state shared across Axum handlers.
///
/// Wrapped in an [`Arc`](std::sync::Arc) by the router. The coordinator is
/// itself cheaply cloneable, so the binary keeps its own handle for
/// shutdown.
#[derive(Debug)]
pub struct AppState<D: DeliveryClient> {
    /// Batching engine that receives every accepted event.
    pub coordinator: BatchCoordinator<D>,
}

impl<D: DeliveryClient> AppState<D> {
    /// Wrap a coordinator for use by the router.
    pub const fn new(coordinator: BatchCoordinator<D>) -> Self {
        Self { coordinator }
    }
}
