//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use storefront_runtime::Storefront;

/// Application state shared across all HTTP handlers.
///
/// Generic over the order store so tests can serve the same routes from
/// in-memory doubles. Cloning is cheap: every service holds `Arc`s.
pub struct AppState<S> {
    /// Storefront services
    pub storefront: Storefront<S>,
    /// Prometheus handle for `GET /metrics`, when the exporter is installed
    pub metrics: Option<PrometheusHandle>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storefront: self.storefront.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S> AppState<S> {
    /// State without a metrics endpoint.
    #[must_use]
    pub const fn new(storefront: Storefront<S>) -> Self {
        Self {
            storefront,
            metrics: None,
        }
    }

    /// Serve `handle` on `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_testing::InMemoryOrderStore;

    #[test]
    fn test_state_is_clone() {
        // Axum requires state to be Clone
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState<InMemoryOrderStore>>();
    }
}
