//! Process-level disposition of fatal delivery failures.
//!
//! The core reports every batch that exhausted its retries on a
//! [`FatalReceiver`]. The [`Supervisor`] drains that receiver and applies
//! the configured [`FatalPolicy`]:
//!
//! - [`FatalPolicy::Terminate`] -- stop at the first fatal failure. The
//!   binary exits with a non-zero status, abandoning any other in-flight
//!   batches.
//! - [`FatalPolicy::Continue`] -- log the lost batch and keep serving.

use std::str::FromStr;
use std::time::Duration;

use hookrelay_core::{
    BatchCoordinator, DeliveryClient, FatalDeliveryError, FatalReceiver, ShutdownReport,
};
use tracing::{error, warn};

/// What to do when a batch exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FatalPolicy {
    /// Shut the process down with a non-zero exit status.
    #[default]
    Terminate,
    /// Drop the batch, log an alert, and keep accepting events.
    Continue,
}

impl FromStr for FatalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminate" | "exit" => Ok(Self::Terminate),
            "continue" | "drop" => Ok(Self::Continue),
            other => Err(format!("unknown fatal policy: {other}")),
        }
    }
}

/// Error returned when the supervisor decides to stop the process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A batch exhausted its retries under [`FatalPolicy::Terminate`].
    #[error("fatal delivery failure: {0}")]
    Fatal(#[from] FatalDeliveryError),
}

/// Applies a [`FatalPolicy`] to fatal delivery failures.
#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    policy: FatalPolicy,
}

impl Supervisor {
    /// Create a supervisor with the given policy.
    pub const fn new(policy: FatalPolicy) -> Self {
        Self { policy }
    }

    /// The policy this supervisor applies.
    pub const fn policy(&self) -> FatalPolicy {
        self.policy
    }

    /// Drain `fatal` until the policy says stop or the channel closes.
    ///
    /// Returns the number of tolerated failures when the channel closes.
    /// Cancelling the returned future loses no failures; the next call
    /// picks up where this one stopped.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Fatal`] on the first failure under
    /// [`FatalPolicy::Terminate`].
    pub async fn watch(&self, fatal: &mut FatalReceiver) -> Result<u64, SupervisorError> {
        let mut tolerated: u64 = 0;
        while let Some(failure) = fatal.recv().await {
            self.apply(failure, &mut tolerated)?;
        }
        Ok(tolerated)
    }

    /// Apply the policy to failures already queued on `fatal`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Fatal`] on the first failure under
    /// [`FatalPolicy::Terminate`].
    pub fn drain(&self, fatal: &mut FatalReceiver) -> Result<u64, SupervisorError> {
        let mut tolerated: u64 = 0;
        while let Some(failure) = fatal.try_recv() {
            self.apply(failure, &mut tolerated)?;
        }
        Ok(tolerated)
    }

    /// Shut `coordinator` down while still supervising its deliveries.
    ///
    /// The final flush and the in-flight batches can exhaust their retries
    /// during the grace period. Those failures are subject to the policy
    /// like any other, so under [`FatalPolicy::Terminate`] the first one
    /// ends the shutdown with an error.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Fatal`] if a batch fails for good before
    /// the shutdown completes.
    pub async fn supervise_shutdown<D: DeliveryClient>(
        &self,
        coordinator: &BatchCoordinator<D>,
        fatal: &mut FatalReceiver,
        grace: Duration,
    ) -> Result<ShutdownReport, SupervisorError> {
        let stopped = tokio::select! {
            biased;
            watched = self.watch(fatal) => Err(watched),
            report = coordinator.shutdown(grace) => Ok(report),
        };

        match stopped {
            Ok(report) => {
                self.drain(fatal)?;
                Ok(report)
            }
            Err(watched) => {
                watched?;
                Ok(coordinator.shutdown(grace).await)
            }
        }
    }

    fn apply(
        &self,
        failure: FatalDeliveryError,
        tolerated: &mut u64,
    ) -> Result<(), SupervisorError> {
        match self.policy {
            FatalPolicy::Terminate => {
                error!(
                    batch_id = %failure.batch_id,
                    batch_size = failure.batch_size,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "Failed to send batch after retries, exiting"
                );
                Err(SupervisorError::Fatal(failure))
            }
            FatalPolicy::Continue => {
                *tolerated = tolerated.saturating_add(1);
                warn!(
                    batch_id = %failure.batch_id,
                    batch_size = failure.batch_size,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    tolerated = *tolerated,
                    "Dropping undeliverable batch and continuing"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use hookrelay_core::{CoordinatorConfig, DeliveryError, DeliveryReceipt};
    use hookrelay_types::{Batch, Event};

    use super::*;

    struct Unreachable;

    impl DeliveryClient for Unreachable {
        async fn deliver(&self, _batch: &Batch) -> Result<DeliveryReceipt, DeliveryError> {
            Err(DeliveryError::Transport(String::from("connection refused")))
        }
    }

    fn failing_coordinator() -> (BatchCoordinator<Unreachable>, FatalReceiver) {
        coordinator_with_batch_size(1)
    }

    fn coordinator_with_batch_size(
        batch_size: usize,
    ) -> (BatchCoordinator<Unreachable>, FatalReceiver) {
        let config = CoordinatorConfig {
            batch_size,
            retry_delay: Duration::from_millis(10),
            ..CoordinatorConfig::default()
        };
        BatchCoordinator::new(config, Unreachable)
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("terminate".parse::<FatalPolicy>(), Ok(FatalPolicy::Terminate));
        assert_eq!("CONTINUE".parse::<FatalPolicy>(), Ok(FatalPolicy::Continue));
        assert!("sometimes".parse::<FatalPolicy>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_stops_on_first_failure() {
        let (coordinator, mut fatal) = failing_coordinator();
        coordinator.accept(Event::new(serde_json::json!({}))).await;

        let result = Supervisor::new(FatalPolicy::Terminate).watch(&mut fatal).await;
        let Err(SupervisorError::Fatal(failure)) = result else {
            panic!("terminate policy must stop");
        };
        assert_eq!(failure.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn continue_tolerates_failures_until_closed() {
        let (coordinator, mut fatal) = failing_coordinator();
        coordinator.accept(Event::new(serde_json::json!({}))).await;
        coordinator.accept(Event::new(serde_json::json!({}))).await;

        let watcher = tokio::spawn(async move {
            Supervisor::new(FatalPolicy::Continue)
                .watch(&mut fatal)
                .await
        });

        coordinator.wait_idle().await;
        drop(coordinator);

        assert_eq!(watcher.await.unwrap().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_during_shutdown_grace_terminates() {
        let (coordinator, mut fatal) = coordinator_with_batch_size(10);
        coordinator.accept(Event::new(serde_json::json!({}))).await;

        let result = Supervisor::new(FatalPolicy::Terminate)
            .supervise_shutdown(&coordinator, &mut fatal, Duration::from_secs(5))
            .await;

        let Err(SupervisorError::Fatal(failure)) = result else {
            panic!("a batch lost during shutdown must stop the process");
        };
        assert_eq!(failure.batch_size, 1);
        assert_eq!(failure.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_during_shutdown_grace_is_tolerated_under_continue() {
        let (coordinator, mut fatal) = coordinator_with_batch_size(10);
        coordinator.accept(Event::new(serde_json::json!({}))).await;

        let report = Supervisor::new(FatalPolicy::Continue)
            .supervise_shutdown(&coordinator, &mut fatal, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.flushed_events, 1);
        assert_eq!(report.abandoned_batches, 0);
        assert_eq!(coordinator.stats().await.batches_failed, 1);
        assert!(fatal.try_recv().is_none());
    }
}
