//! Shared type definitions for the Hookrelay webhook relay.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for events and batches
//! - [`event`] -- [`Event`] and [`Batch`], the units moved by the core
//! - [`payload`] -- Wire shape of inbound webhook bodies

pub mod event;
pub mod ids;
pub mod payload;

// Re-export all public types at crate root for convenience.
pub use event::{Batch, Event};
pub use ids::{BatchId, EventId};
pub use payload::{Login, Meta, PhoneNumbers, WebhookPayload};
