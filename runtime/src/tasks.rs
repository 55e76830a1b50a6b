//! Outbox relay: delivers recorded tasks at least once.
//!
//! ```text
//! claim (lease) ──► handler ──► Ok  ──► complete
//!                      │
//!                      └──► Err ──► retry at now + backoff(attempts)
//! ```
//!
//! A task is only removed from the outbox once its handler succeeded. A
//! relay that dies mid-batch leaves its rows leased; they become due again
//! when the lease expires. Tasks that keep failing stay in the outbox at the
//! capped backoff and are reported at error level.

use crate::metrics::TaskMetrics;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::BoxFuture;
use storefront_core::environment::Clock;
use storefront_core::error::StoreError;
use storefront_core::store::OrderStore;
use storefront_core::task::{PendingTask, Task, TaskError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Executes deferred tasks. Must tolerate seeing a task more than once.
pub trait TaskHandler: Send + Sync + 'static {
    /// Handle one task.
    fn handle<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, Result<(), TaskError>>;
}

/// Handler that only logs; email and other side channels are external.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTaskHandler;

impl TaskHandler for LoggingTaskHandler {
    fn handle<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            match task {
                Task::OrderPlaced { order_id, user_id } => {
                    tracing::info!(order_id = %order_id, user_id = %user_id, "Order placed");
                }
                Task::PaymentConfirmed { order_id, trade_no } => {
                    tracing::info!(order_id = %order_id, trade_no = %trade_no, "Payment confirmed");
                }
            }
            Ok(())
        })
    }
}

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Pause between two polls once the outbox has nothing due
    pub poll_interval: Duration,
    /// Rows claimed per poll
    pub batch_size: usize,
    /// How long a claimed row stays hidden from other relays
    pub lease: Duration,
    /// Redelivery delay by attempt; only the delays are used
    pub backoff: RetryPolicy,
    /// Failures from this attempt on are logged as errors
    pub escalate_after: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 32,
            lease: Duration::from_secs(60),
            backoff: RetryPolicy::builder()
                .initial_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(300))
                .build(),
            escalate_after: 5,
        }
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Drains the outbox of an [`OrderStore`] into a [`TaskHandler`].
pub struct TaskRelay<S> {
    store: Arc<S>,
    handler: Arc<dyn TaskHandler>,
    clock: Arc<dyn Clock>,
    settings: RelaySettings,
}

impl<S: OrderStore + 'static> TaskRelay<S> {
    /// Relay over `store`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        handler: Arc<dyn TaskHandler>,
        clock: Arc<dyn Clock>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            handler,
            clock,
            settings,
        }
    }

    /// Claim one batch of due rows and deliver each. Returns how many rows
    /// were claimed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the outbox cannot be read or updated. Rows
    /// claimed before the failure become due again when their lease expires.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let batch = self
            .store
            .claim_tasks(now, after(now, self.settings.lease), self.settings.batch_size)
            .await?;

        for pending in &batch {
            self.deliver(pending).await?;
        }
        Ok(batch.len())
    }

    async fn deliver(&self, pending: &PendingTask) -> Result<(), StoreError> {
        let kind = pending.task.kind();
        match self.handler.handle(&pending.task).await {
            Ok(()) => {
                self.store.complete_task(pending.id).await?;
                TaskMetrics::record_processed(kind);
                tracing::debug!(task_id = pending.id, kind, attempts = pending.attempts, "Task delivered");
            }
            Err(err) => {
                TaskMetrics::record_failed(kind);
                let step = usize::try_from(pending.attempts.saturating_sub(1)).unwrap_or(usize::MAX);
                let delay = self.settings.backoff.delay_for_attempt(step);
                if pending.attempts >= self.settings.escalate_after {
                    tracing::error!(
                        task_id = pending.id,
                        kind,
                        attempts = pending.attempts,
                        error = %err,
                        "Task keeps failing, kept in outbox"
                    );
                } else {
                    tracing::warn!(
                        task_id = pending.id,
                        kind,
                        attempts = pending.attempts,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Task failed, will retry"
                    );
                }
                self.store
                    .retry_task(pending.id, &err.to_string(), after(self.clock.now(), delay))
                    .await?;
            }
        }
        Ok(())
    }

    /// Poll the outbox on the current tokio runtime until `shutdown` turns
    /// `true` or its sender is dropped.
    ///
    /// A full batch is followed by another poll right away; otherwise the
    /// relay sleeps `poll_interval`. Undelivered rows stay in the outbox.
    #[must_use]
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                let claimed = match self.run_once().await {
                    Ok(claimed) => claimed,
                    Err(err) => {
                        tracing::warn!(error = %err, "Outbox poll failed");
                        0
                    }
                };
                if claimed >= self.settings.batch_size {
                    continue;
                }

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
            tracing::debug!("Task relay stopped");
        })
    }
}
