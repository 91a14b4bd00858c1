//! Batch accumulation and delivery engine for the Hookrelay webhook relay.
//!
//! This crate owns everything between "an event was accepted" and "a batch
//! was acknowledged downstream (or given up on)". It knows nothing about
//! HTTP; the transport is plugged in through [`DeliveryClient`].
//!
//! # Modules
//!
//! - [`buffer`] -- [`EventBuffer`], the lock-guarded batch-in-progress.
//! - [`trigger`] -- [`FlushTrigger`] size threshold and interval timers.
//! - [`delivery`] -- [`DeliveryClient`] trait and per-attempt errors.
//! - [`retry`] -- [`RetryPolicy`] and the [`FatalDeliveryError`] it
//!   escalates.
//! - [`coordinator`] -- [`BatchCoordinator`], the top-level object the
//!   ingestion layer talks to.
//! - [`config`] -- [`CoordinatorConfig`] with documented defaults.

pub mod buffer;
pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod retry;
pub mod trigger;

pub use buffer::{AddOutcome, EventBuffer};
pub use config::CoordinatorConfig;
pub use coordinator::{
    AcceptOutcome, BatchCoordinator, CoordinatorStats, FatalReceiver, FlushReason, ShutdownReport,
};
pub use delivery::{DeliveryClient, DeliveryError, DeliveryReceipt};
pub use retry::{DeliveryAttempt, DeliveryReport, FatalDeliveryError, RetryPolicy};
pub use trigger::{FlushTimer, FlushTrigger};
