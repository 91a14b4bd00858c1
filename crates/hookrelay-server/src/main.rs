//! Hookrelay binary entry point.
//!
//! Loads configuration from the environment, starts the batching engine and
//! the HTTP server, and supervises fatal delivery failures.
//!
//! # Lifecycle
//!
//! ```text
//! POST /log --> BatchCoordinator --> HttpDeliveryClient --> {endpoint}/batch
//!                      |
//!                      +--> FatalReceiver --> Supervisor
//! ```
//!
//! On `Ctrl-C` or `SIGTERM` the server stops accepting requests, the
//! pending batch is flushed, and in-flight deliveries get
//! `SHUTDOWN_GRACE` seconds to finish. Under the `terminate` fatal policy
//! a batch that exhausts its retries ends the process with a non-zero
//! exit status instead.

use std::sync::Arc;

use anyhow::Context;
use hookrelay_core::BatchCoordinator;
use hookrelay_server::{
    AppState, HttpDeliveryClient, LogFormat, RelayConfig, Supervisor, shutdown_signal,
    start_server,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();
    init_tracing(config.log_format);

    info!("hookrelay starting");
    for fallback in &config.fallbacks {
        warn!(
            key = fallback.key,
            raw = %fallback.raw,
            "Ignoring invalid configuration value, using default"
        );
    }
    debug!(?config, "configuration loaded");
    info!(
        batch_size = config.coordinator.batch_size,
        batch_interval_secs = config.coordinator.batch_interval.as_secs(),
        endpoint = %config.endpoint,
        max_attempts = config.coordinator.max_attempts,
        fatal_policy = ?config.fatal_policy,
        "Relay configured"
    );

    let client = HttpDeliveryClient::new(&config.endpoint, config.delivery_timeout)
        .context("failed to build delivery client")?;
    info!(url = client.url(), "Delivery client ready");

    let (coordinator, mut fatal) = BatchCoordinator::new(config.coordinator, client);
    let state = Arc::new(AppState::new(coordinator.clone()));
    let supervisor = Supervisor::new(config.fatal_policy);

    tokio::select! {
        served = start_server(&config.server, state, shutdown_signal()) => {
            served.context("HTTP server failed")?;
        }
        watched = supervisor.watch(&mut fatal) => {
            watched.context("aborting after undeliverable batch")?;
        }
    }

    let report = supervisor
        .supervise_shutdown(&coordinator, &mut fatal, config.shutdown_grace)
        .await
        .context("aborting after undeliverable batch during shutdown")?;
    info!(
        flushed_events = report.flushed_events,
        abandoned_batches = report.abandoned_batches,
        "hookrelay stopped"
    );
    Ok(())
}
