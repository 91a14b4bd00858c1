//! Top-level batching engine.
//!
//! [`BatchCoordinator`] ties the [`EventBuffer`], the [`FlushTrigger`] and
//! the [`RetryPolicy`] together. Each batch goes through three states:
//!
//! - **Accumulating** -- the single live buffer accepts events while the
//!   size and interval triggers are watched.
//! - **Flushing** -- a trigger fired, the batch was detached and is being
//!   delivered on its own Tokio task. A new accumulating batch is already
//!   live, so ingestion never waits on delivery. Any number of flushing
//!   batches may coexist and complete in any order.
//! - **Fatal failure** -- the retry budget ran out. The
//!   [`FatalDeliveryError`] is sent to the supervisor through the
//!   [`FatalReceiver`] returned by [`BatchCoordinator::new`]. The coordinator
//!   itself keeps accepting; terminating the process is the supervisor's
//!   decision.
//!
//! # Delivery guarantees
//!
//! Delivery is at-least-once per attempt budget: a batch whose request
//! reached the endpoint but whose response was lost is sent again on the
//! next attempt. Events are lost when a batch is escalated as fatal, or
//! when shutdown abandons in-flight batches after the grace period.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use hookrelay_types::{Batch, BatchId, Event};
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

use crate::buffer::{AddOutcome, EventBuffer};
use crate::config::CoordinatorConfig;
use crate::delivery::DeliveryClient;
use crate::retry::{FatalDeliveryError, RetryPolicy};

/// Why a batch was detached from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The batch reached the size threshold.
    Size,
    /// The batch interval elapsed since its first event.
    Interval,
    /// An explicit [`BatchCoordinator::flush_now`] call.
    Manual,
    /// The coordinator is shutting down.
    Shutdown,
}

impl FlushReason {
    /// Label used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Interval => "interval",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Result of [`BatchCoordinator::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The event joined the in-progress batch.
    Buffered,
    /// The event completed a batch, which was handed to delivery.
    Flushed {
        /// The batch that was detached.
        batch_id: BatchId,
        /// Number of events in it.
        batch_size: usize,
    },
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Events accepted since start.
    pub events_accepted: u64,
    /// Events in the in-progress batch.
    pub pending_events: usize,
    /// Batches currently being delivered.
    pub in_flight_batches: usize,
    /// Batches detached from the buffer since start.
    pub batches_flushed: u64,
    /// Batches acknowledged by the endpoint.
    pub batches_delivered: u64,
    /// Batches escalated as fatal failures.
    pub batches_failed: u64,
}

/// Result of [`BatchCoordinator::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Events in the final batch flushed during shutdown.
    pub flushed_events: usize,
    /// Deliveries still running when the grace period ran out.
    pub abandoned_batches: usize,
}

/// Receiving end for fatal delivery failures.
///
/// Held by the process supervisor, which decides whether a fatal failure
/// terminates the process or is only reported.
#[derive(Debug)]
pub struct FatalReceiver {
    rx: mpsc::UnboundedReceiver<FatalDeliveryError>,
}

impl FatalReceiver {
    /// Wait for the next fatal failure.
    ///
    /// Returns `None` once every coordinator handle has been dropped.
    pub async fn recv(&mut self) -> Option<FatalDeliveryError> {
        self.rx.recv().await
    }

    /// Return a fatal failure if one is already queued.
    pub fn try_recv(&mut self) -> Option<FatalDeliveryError> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    flushed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
}

struct Shared<D> {
    buffer: EventBuffer,
    retry: RetryPolicy,
    client: D,
    fatal_tx: mpsc::UnboundedSender<FatalDeliveryError>,
    counters: Counters,
    idle: Notify,
}

/// Orchestrates accumulation, flush triggers and retried delivery.
///
/// Cloning is cheap; all clones share one buffer.
pub struct BatchCoordinator<D> {
    shared: Arc<Shared<D>>,
}

impl<D> std::fmt::Debug for BatchCoordinator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("trigger", self.shared.buffer.trigger())
            .field("retry", &self.shared.retry)
            .field("counters", &self.shared.counters)
            .finish_non_exhaustive()
    }
}

impl<D> Clone for BatchCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: DeliveryClient> BatchCoordinator<D> {
    /// Create a coordinator delivering through `client`.
    ///
    /// Returns the coordinator and the receiver on which fatal delivery
    /// failures are reported.
    pub fn new(config: CoordinatorConfig, client: D) -> (Self, FatalReceiver) {
        let (fatal_tx, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            buffer: EventBuffer::new(config.trigger()),
            retry: config.retry_policy(),
            client,
            fatal_tx,
            counters: Counters::default(),
            idle: Notify::new(),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            FatalReceiver { rx },
        )
    }

    /// Accept one event.
    ///
    /// Never waits on delivery. If the event completes a batch, the batch
    /// is detached and handed to a background delivery task before this
    /// returns. If it opens a batch, the interval timer for that batch is
    /// armed.
    pub async fn accept(&self, event: Event) -> AcceptOutcome {
        self.shared.counters.accepted.fetch_add(1, Ordering::Relaxed);

        match self.shared.buffer.add(event).await {
            AddOutcome::Ready(batch) => {
                let outcome = AcceptOutcome::Flushed {
                    batch_id: batch.id,
                    batch_size: batch.len(),
                };
                self.dispatch(batch, FlushReason::Size);
                outcome
            }
            AddOutcome::Pending { generation, opened } => {
                if opened {
                    self.arm_interval(generation).await;
                }
                AcceptOutcome::Buffered
            }
        }
    }

    /// Flush the in-progress batch immediately.
    ///
    /// Returns `false` without contacting the endpoint when the buffer is
    /// empty.
    pub async fn flush_now(&self) -> bool {
        match self.shared.buffer.take_and_reset().await {
            Some(batch) => {
                self.dispatch(batch, FlushReason::Manual);
                true
            }
            None => false,
        }
    }

    /// Number of events in the in-progress batch.
    pub async fn pending(&self) -> usize {
        self.shared.buffer.len().await
    }

    /// Snapshot of the coordinator counters.
    pub async fn stats(&self) -> CoordinatorStats {
        let counters = &self.shared.counters;
        CoordinatorStats {
            events_accepted: counters.accepted.load(Ordering::Relaxed),
            pending_events: self.pending().await,
            in_flight_batches: counters.in_flight.load(Ordering::Acquire),
            batches_flushed: counters.flushed.load(Ordering::Relaxed),
            batches_delivered: counters.delivered.load(Ordering::Relaxed),
            batches_failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Wait until no delivery task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.counters.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Flush what is left and wait up to `grace` for in-flight deliveries.
    ///
    /// Deliveries still running afterwards are abandoned: their tasks keep
    /// running until the runtime shuts down, but nobody waits for them.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let flushed_events = match self.shared.buffer.take_and_reset().await {
            Some(batch) => {
                let size = batch.len();
                self.dispatch(batch, FlushReason::Shutdown);
                size
            }
            None => 0,
        };

        let abandoned_batches = match tokio::time::timeout(grace, self.wait_idle()).await {
            Ok(()) => 0,
            Err(_elapsed) => {
                let in_flight = self.shared.counters.in_flight.load(Ordering::Acquire);
                warn!(
                    in_flight,
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "Shutdown grace period elapsed, abandoning in-flight deliveries"
                );
                in_flight
            }
        };

        info!(flushed_events, abandoned_batches, "Batch coordinator stopped");
        ShutdownReport {
            flushed_events,
            abandoned_batches,
        }
    }

    /// Arm the interval timer for a batch that was just opened.
    async fn arm_interval(&self, generation: u64) {
        let coordinator = self.clone();
        let timer = self
            .shared
            .buffer
            .trigger()
            .arm(async move { coordinator.on_interval(generation).await });
        if !self.shared.buffer.arm(generation, timer).await {
            debug!(generation, "Batch flushed before its interval timer was armed");
        }
    }

    /// Interval timer callback for `generation`.
    async fn on_interval(&self, generation: u64) {
        match self.shared.buffer.take_generation(generation).await {
            Some(batch) => self.dispatch(batch, FlushReason::Interval),
            None => debug!(generation, "Interval timer fired after batch was flushed"),
        }
    }

    /// Hand a detached batch to a background delivery task.
    fn dispatch(&self, batch: Batch, reason: FlushReason) {
        let counters = &self.shared.counters;
        counters.flushed.fetch_add(1, Ordering::Relaxed);
        counters.in_flight.fetch_add(1, Ordering::AcqRel);

        info!(
            batch_id = %batch.id,
            batch_size = batch.len(),
            reason = reason.as_str(),
            "Sending batch to external endpoint"
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            match shared.retry.deliver(&shared.client, &batch).await {
                Ok(_report) => {
                    shared.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(fatal) => {
                    shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                    if let Err(unsent) = shared.fatal_tx.send(fatal) {
                        error!(
                            error = %unsent.0,
                            "No supervisor is listening for fatal delivery failures"
                        );
                    }
                }
            }
            if shared.counters.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                shared.idle.notify_waiters();
            }
        });
    }
}
