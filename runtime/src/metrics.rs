//! Prometheus metrics for the order pipeline.
//!
//! # Example
//!
//! ```rust,no_run
//! use storefront_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// `addr` is where the HTTP binary serves [`MetricsServer::render`].
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus exporter.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// logs a warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the scrape endpoint is served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Commit
    describe_counter!(
        "commit_total",
        "Order commits by outcome (committed or a reject reason)"
    );
    describe_counter!(
        "commit_cas_conflicts_total",
        "Conditional stock decrements that matched zero rows"
    );
    describe_histogram!(
        "commit_duration_seconds",
        "Time from commit request to outcome"
    );
    describe_counter!(
        "cart_cleanup_failures_total",
        "Cart entries left behind after a durable commit"
    );

    // Payment
    describe_counter!(
        "payment_poll_total",
        "Gateway payment queries by interpreted outcome"
    );

    // Tasks
    describe_counter!("tasks_processed_total", "Outbox tasks delivered, by kind");
    describe_counter!(
        "tasks_failed_total",
        "Outbox task deliveries that failed and were rescheduled, by kind"
    );
}

/// Commit engine metrics recorder.
pub struct CommitMetrics;

impl CommitMetrics {
    /// Record a finished commit.
    pub fn record_outcome(outcome: &'static str, duration: Duration) {
        counter!("commit_total", "outcome" => outcome).increment(1);
        histogram!("commit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a lost compare-and-swap.
    pub fn record_conflict() {
        counter!("commit_cas_conflicts_total").increment(1);
    }

    /// Record a failed post-commit cart cleanup.
    pub fn record_cleanup_failure() {
        counter!("cart_cleanup_failures_total").increment(1);
    }
}

/// Payment polling metrics recorder.
pub struct PaymentMetrics;

impl PaymentMetrics {
    /// Record one gateway query outcome.
    pub fn record_poll(outcome: &'static str) {
        counter!("payment_poll_total", "outcome" => outcome).increment(1);
    }
}

/// Outbox relay metrics recorder.
pub struct TaskMetrics;

impl TaskMetrics {
    /// Record a handled task.
    pub fn record_processed(kind: &'static str) {
        counter!("tasks_processed_total", "kind" => kind).increment(1);
    }

    /// Record a failed delivery; the task stays in the outbox.
    pub fn record_failed(kind: &'static str) {
        counter!("tasks_failed_total", "kind" => kind).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_recorders_are_noops_without_exporter() {
        // No recorder installed: the macros must not panic.
        CommitMetrics::record_outcome("committed", Duration::from_millis(3));
        CommitMetrics::record_conflict();
        PaymentMetrics::record_poll("pending");
        TaskMetrics::record_processed("order_placed");
    }
}
