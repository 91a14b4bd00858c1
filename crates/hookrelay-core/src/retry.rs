//! Bounded retry around a [`DeliveryClient`].
//!
//! [`RetryPolicy::deliver`] makes up to `max_attempts` calls for one batch,
//! sleeping a fixed delay between consecutive attempts. A success at any
//! attempt ends the loop. Running out of attempts produces a
//! [`FatalDeliveryError`], which is a different type from the per-attempt
//! [`DeliveryError`] so callers cannot confuse "try again" with "give up".
//!
//! The policy only borrows the batch. A failed batch is never pushed back
//! into the live buffer.

use std::time::Duration;

use hookrelay_types::{Batch, BatchId};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::delivery::{DeliveryClient, DeliveryError, DeliveryReceipt};

/// Default number of delivery attempts per batch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between consecutive delivery attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Fixed-delay, bounded-attempt retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// Outcome of a batch that reached the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// The delivered batch.
    pub batch_id: BatchId,
    /// Number of events in the batch.
    pub batch_size: usize,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Time from the first attempt to the successful response.
    pub elapsed: Duration,
    /// Receipt returned by the client.
    pub receipt: DeliveryReceipt,
}

/// A batch that exhausted its retry budget.
///
/// This is the only error that leaves the core. The batch is considered
/// lost once this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("batch {batch_id} ({batch_size} events) failed after {attempts} attempts: {last_error}")]
pub struct FatalDeliveryError {
    /// The batch that could not be delivered.
    pub batch_id: BatchId,
    /// Number of events lost with it.
    pub batch_size: usize,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Error reported by the final attempt.
    #[source]
    pub last_error: DeliveryError,
}

/// Bookkeeping for one batch while it is being delivered.
#[derive(Debug)]
pub struct DeliveryAttempt {
    /// The batch being delivered.
    pub batch_id: BatchId,
    /// Number of events in the batch.
    pub batch_size: usize,
    /// Attempts started so far.
    pub attempts: u32,
    /// Error from the most recent failed attempt.
    pub last_error: Option<DeliveryError>,
}

impl DeliveryAttempt {
    /// Start tracking delivery of `batch`.
    pub fn new(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id,
            batch_size: batch.len(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Count a new attempt and return its 1-based number.
    pub const fn begin(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Record the error of the current attempt.
    pub fn fail(&mut self, error: DeliveryError) {
        self.last_error = Some(error);
    }

    /// Turn an exhausted attempt into the fatal error.
    pub fn escalate(self) -> FatalDeliveryError {
        FatalDeliveryError {
            batch_id: self.batch_id,
            batch_size: self.batch_size,
            attempts: self.attempts,
            last_error: self
                .last_error
                .unwrap_or_else(|| DeliveryError::Transport(String::from("no attempt was made"))),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` of zero is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Maximum number of attempts per batch.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between consecutive attempts.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Deliver `batch` through `client`, retrying failed attempts.
    ///
    /// # Errors
    ///
    /// Returns [`FatalDeliveryError`] when every attempt failed.
    pub async fn deliver<D>(
        &self,
        client: &D,
        batch: &Batch,
    ) -> Result<DeliveryReport, FatalDeliveryError>
    where
        D: DeliveryClient,
    {
        let started = Instant::now();
        let mut attempt = DeliveryAttempt::new(batch);

        loop {
            let number = attempt.begin();
            match client.deliver(batch).await {
                Ok(receipt) => {
                    let elapsed = started.elapsed();
                    info!(
                        batch_id = %batch.id,
                        batch_size = attempt.batch_size,
                        attempts = number,
                        status_code = receipt.status,
                        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "Batch sent successfully"
                    );
                    return Ok(DeliveryReport {
                        batch_id: batch.id,
                        batch_size: attempt.batch_size,
                        attempts: number,
                        elapsed,
                        receipt,
                    });
                }
                Err(e) => {
                    if number >= self.max_attempts {
                        attempt.fail(e);
                        let fatal = attempt.escalate();
                        error!(
                            batch_id = %fatal.batch_id,
                            batch_size = fatal.batch_size,
                            attempts = fatal.attempts,
                            error = %fatal.last_error,
                            "Batch delivery failed, retry budget exhausted"
                        );
                        return Err(fatal);
                    }
                    warn!(
                        batch_id = %batch.id,
                        attempt = number,
                        max_attempts = self.max_attempts,
                        retry_in_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Batch delivery attempt failed, retrying"
                    );
                    attempt.fail(e);
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use hookrelay_types::Event;

    use super::*;

    /// Client that replays a fixed script of outcomes and records call times.
    struct ScriptedClient {
        script: Mutex<VecDeque<bool>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedClient {
        fn new(script: &[bool]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DeliveryClient for ScriptedClient {
        async fn deliver(&self, _batch: &Batch) -> Result<DeliveryReceipt, DeliveryError> {
            self.calls.lock().unwrap().push(Instant::now());
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(false);
            if ok {
                Ok(DeliveryReceipt { status: 200 })
            } else {
                Err(DeliveryError::Transport(String::from("connection refused")))
            }
        }
    }

    fn batch() -> Batch {
        Batch::start(Event::new(serde_json::json!({"user_id": 1})))
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_is_not_retried() {
        let client = ScriptedClient::new(&[true, true]);
        let report = RetryPolicy::default().deliver(&client, &batch()).await.unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(client.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_twice_then_succeed_reports_three_attempts() {
        let client = ScriptedClient::new(&[false, false, true]);
        let batch = batch();
        let report = RetryPolicy::default().deliver(&client, &batch).await.unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.batch_id, batch.id);
        assert_eq!(report.receipt.status, 200);
        assert!(report.elapsed >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_makes_exactly_three_spaced_attempts() {
        let client = ScriptedClient::new(&[]);
        let batch = batch();
        let fatal = RetryPolicy::default()
            .deliver(&client, &batch)
            .await
            .unwrap_err();

        assert_eq!(fatal.attempts, 3);
        assert_eq!(fatal.batch_id, batch.id);
        assert_eq!(fatal.batch_size, 1);
        assert!(matches!(fatal.last_error, DeliveryError::Transport(_)));

        let times = client.call_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            if let [earlier, later] = pair {
                assert!(*later - *earlier >= Duration::from_secs(2));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_sleep_after_final_attempt() {
        let client = ScriptedClient::new(&[]);
        let started = Instant::now();
        let _ = RetryPolicy::new(2, Duration::from_secs(5))
            .deliver(&client, &batch())
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(10));
    }

    #[test]
    fn zero_attempts_is_normalized() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn fatal_error_message_names_the_batch() {
        let b = batch();
        let mut attempt = DeliveryAttempt::new(&b);
        attempt.begin();
        attempt.fail(DeliveryError::Rejected {
            status: 503,
            body: String::from("unavailable"),
        });
        let message = attempt.escalate().to_string();
        assert!(message.contains(&b.id.to_string()));
        assert!(message.contains("503"));
    }
}
