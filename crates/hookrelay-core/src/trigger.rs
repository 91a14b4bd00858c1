//! Flush trigger policy: size threshold and batch interval.
//!
//! Two conditions detach the in-progress batch:
//!
//! - **Size trigger** -- checked synchronously by
//!   [`EventBuffer::add`](crate::buffer::EventBuffer::add) after every
//!   append. The caller whose append reaches the threshold owns the flush.
//! - **Time trigger** -- a [`FlushTimer`] armed when the first event lands
//!   in an empty buffer. It fires `interval` after that arrival, not on a
//!   fixed wall-clock tick, and is re-armed for every new batch.
//!
//! A timer belongs to exactly one batch generation. When a size-triggered
//! or manual flush detaches the batch first, the buffer aborts the timer.
//! If the abort loses the race, the late firing is a no-op because the
//! generation no longer matches.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Default number of events that triggers a size flush.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default time between the first event of a batch and its interval flush.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(60);

/// When to flush the in-progress batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushTrigger {
    threshold: usize,
    interval: Duration,
}

impl FlushTrigger {
    /// Create a trigger. A threshold of zero is treated as one.
    pub fn new(threshold: usize, interval: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            interval,
        }
    }

    /// Number of events that triggers a size flush.
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Delay between the first event of a batch and its interval flush.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a batch of `len` events must be flushed now.
    pub const fn size_reached(&self, len: usize) -> bool {
        len >= self.threshold
    }

    /// Arm the interval timer for a freshly opened batch.
    ///
    /// `on_fire` runs on a background task once `interval` has elapsed,
    /// unless the returned [`FlushTimer`] is cancelled first.
    pub fn arm<F>(&self, on_fire: F) -> FlushTimer
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let interval = self.interval;
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            on_fire.await;
        });
        FlushTimer {
            handle: task.abort_handle(),
        }
    }
}

impl Default for FlushTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_INTERVAL)
    }
}

/// Handle to a pending interval flush.
///
/// Dropping the handle does not cancel the timer; call
/// [`cancel`](Self::cancel) for that.
#[derive(Debug)]
pub struct FlushTimer {
    handle: AbortHandle,
}

impl FlushTimer {
    /// Abort the timer. Harmless if it already fired.
    pub fn cancel(self) {
        self.handle.abort();
    }
}
