//! Retry combinators.
//!
//! Two kinds of retry live here:
//!
//! - [`retry_with_backoff`] / [`retry_with_predicate`] for transient
//!   failures (network, gateway, task handlers)
//! - [`retry_optimistic`] for the read-decide-update cycle of a
//!   compare-and-swap, where losing a race is not an error but a signal to
//!   re-read
//!
//! # Example
//!
//! ```rust
//! use storefront_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! let result = retry_with_backoff(policy, || async {
//!     // Your fallible operation here
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use storefront_core::BoxFuture;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: off
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Scale each delay by a random factor in `0.5..=1.0`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: Some(3),
            initial_delay: Some(Duration::from_millis(100)),
            max_delay: Some(Duration::from_secs(30)),
            multiplier: Some(2.0),
            jitter: false,
        }
    }

    /// Policy for compare-and-swap loops: 3 attempts in total, a few
    /// milliseconds of jittered backoff between them.
    #[must_use]
    pub const fn optimistic() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Total number of attempts this policy allows (first try included).
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = initial_delay * (multiplier ^ attempt)
    /// Capped at `max_delay`, then scaled by the jitter factor if enabled.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        // attempt counts stay tiny, the cast cannot wrap in practice
        let base_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let delay_ms = if self.jitter {
            use rand::Rng;
            capped_ms * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: bool,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the total number of attempts (`max_retries + 1`). Zero is treated
    /// as one.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_retries = Some(attempts.saturating_sub(1));
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(3),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(100)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Returns `Ok(T)` if the operation succeeds within the retry limit,
/// or `Err(E)` with the last error if all retries are exhausted.
///
/// # Errors
///
/// Returns the last error once `policy.max_retries` retries have failed.
///
/// # Example
///
/// ```rust
/// use storefront_runtime::retry::{RetryPolicy, retry_with_backoff};
///
/// # async fn example() -> Result<(), String> {
/// let policy = RetryPolicy::default();
///
/// let result = retry_with_backoff(policy, || async {
///     // Simulated fallible operation
///     Ok::<_, String>(42)
/// }).await?;
///
/// assert_eq!(result, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(policy: RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}

/// Retry an async operation, but only for errors `is_retryable` accepts.
///
/// # Errors
///
/// Returns a non-retryable error immediately, or the last error once
/// `policy.max_retries` retries have failed.
///
/// # Example
///
/// ```rust
/// use storefront_runtime::retry::{RetryPolicy, retry_with_predicate};
///
/// # async fn example() -> Result<(), String> {
/// let policy = RetryPolicy::default();
///
/// let result = retry_with_predicate(
///     policy,
///     || async { Ok::<_, String>(42) },
///     |err: &String| err.contains("transient"),
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::warn!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(attempt, error = %err, "Operation failed after max retries");
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Outcome of one optimistic attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The conditional write matched; stop.
    Done(T),
    /// The conditional write matched zero rows; re-read and try again.
    Conflict,
}

/// Why an optimistic loop stopped without a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticError<E> {
    /// The operation decided the request cannot succeed (not retried).
    Rejected(E),
    /// Every attempt ended in [`Attempt::Conflict`].
    Exhausted {
        /// Attempts made
        attempts: usize,
    },
}

/// Run a read-decide-update cycle until it lands, a decision rejects it, or
/// the policy's attempt budget runs out.
///
/// `op` receives `state` (typically an open transaction) and the zero-based
/// attempt number. It must re-read whatever it compares against on every
/// call. Backoff is applied only between conflicting attempts.
///
/// # Errors
///
/// - [`OptimisticError::Rejected`] as soon as `op` returns `Err`
/// - [`OptimisticError::Exhausted`] after `policy.max_attempts()` conflicts
pub async fn retry_optimistic<S, F, T, E>(
    policy: &RetryPolicy,
    state: &mut S,
    mut op: F,
) -> Result<T, OptimisticError<E>>
where
    S: Send,
    F: for<'s> FnMut(&'s mut S, usize) -> BoxFuture<'s, Result<Attempt<T>, E>>,
{
    let attempts = policy.max_attempts();

    for attempt in 0..attempts {
        match op(state, attempt).await {
            Ok(Attempt::Done(value)) => return Ok(value),
            Ok(Attempt::Conflict) => {
                tracing::debug!(attempt, "Conditional update lost a race");
                if attempt + 1 < attempts {
                    sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
            Err(err) => return Err(OptimisticError::Rejected(err)),
        }
    }

    Err(OptimisticError::Exhausted { attempts })
}
