//! HTTP front end for the Hookrelay webhook relay.
//!
//! Accepts JSON webhook payloads on `POST /log`, hands them to a
//! [`BatchCoordinator`](hookrelay_core::BatchCoordinator), and delivers
//! finished batches to a downstream endpoint with [`HttpDeliveryClient`].
//!
//! - [`config`] -- environment-driven [`RelayConfig`]
//! - [`router`] / [`handlers`] -- the Axum surface
//! - [`server`] -- listener lifecycle and shutdown signals
//! - [`delivery`] -- `reqwest` transport for outbound batches
//! - [`supervisor`] -- what happens when a batch cannot be delivered

pub mod config;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod supervisor;

pub use config::{LogFormat, RelayConfig};
pub use delivery::HttpDeliveryClient;
pub use error::RelayError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, shutdown_signal, start_server};
pub use state::AppState;
pub use supervisor::{FatalPolicy, Supervisor, SupervisorError};
