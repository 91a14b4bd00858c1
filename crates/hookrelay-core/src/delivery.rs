//! Delivery client trait.
//!
//! The core never talks to the network itself. Once a batch has been
//! detached from the buffer it is handed to a [`DeliveryClient`], which
//! sends it downstream and reports a [`DeliveryReceipt`] or a
//! [`DeliveryError`]. The HTTP implementation lives in the server crate;
//! tests plug in scripted clients.

use std::future::Future;

use hookrelay_types::Batch;

/// Proof that the downstream endpoint accepted a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Status code reported by the downstream endpoint.
    pub status: u16,
}

/// A single failed delivery attempt.
///
/// These are transient from the core's point of view: the retry policy
/// absorbs them until its attempt budget runs out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The request never produced a response (connect, DNS, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the client's deadline.
    #[error("delivery timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// The endpoint answered with a non-success status.
    #[error("endpoint rejected batch with status {status}: {body}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body, truncated by the client.
        body: String,
    },

    /// The batch could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(String),
}

/// Sends one batch to the downstream endpoint.
///
/// Implementations must bound the duration of a call and must not retry
/// internally; retries are owned by [`RetryPolicy`](crate::retry::RetryPolicy).
pub trait DeliveryClient: Send + Sync + 'static {
    /// Deliver `batch` once.
    fn deliver(
        &self,
        batch: &Batch,
    ) -> impl Future<Output = Result<DeliveryReceipt, DeliveryError>> + Send;
}
