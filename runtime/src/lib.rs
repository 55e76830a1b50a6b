//! # Storefront Runtime
//!
//! Services that drive the storefront collaborators defined in
//! `storefront-core`.
//!
//! ## Components
//!
//! - **Commit engine** ([`commit::CommitEngine`]): cart → durable order with
//!   compare-and-swap stock reservation
//! - **Cart service** ([`cart::CartService`]): validated cart mutations and
//!   the cart page
//! - **Order service** ([`orders::OrderService`]): previews, details,
//!   comments, fulfilment transitions
//! - **Payment service** ([`payment::PaymentService`]): gateway initiation
//!   and confirmation by polling
//! - **Task relay** ([`tasks::TaskRelay`]): at-least-once delivery of the
//!   tasks recorded in the store's outbox
//!
//! ## Example
//!
//! ```ignore
//! use storefront_runtime::{Environment, Settings, Storefront};
//!
//! let storefront = Storefront::new(Arc::new(order_store), env, Settings::default());
//! let order_id = storefront.commit.commit(request).await?;
//! ```

use std::sync::Arc;
use storefront_core::store::OrderStore;

pub mod cart;
pub mod commit;
pub mod environment;
pub mod ids;
pub mod orders;
pub mod payment;
pub mod tasks;

/// Retry logic with exponential backoff and optimistic retry
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub use cart::CartService;
pub use commit::{CommitEngine, CommitForm, CommitItem, CommitRequest, CommitSettings};
pub use environment::Environment;
pub use orders::OrderService;
pub use payment::{PaymentConfirmation, PaymentService, PaymentSettings};
pub use tasks::{RelaySettings, TaskRelay};

/// Settings for every service.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Commit engine
    pub commit: CommitSettings,
    /// Payment polling
    pub payment: PaymentSettings,
    /// Outbox relay
    pub relay: RelaySettings,
}

/// All storefront services over one order store.
pub struct Storefront<S> {
    /// Order commits
    pub commit: CommitEngine<S>,
    /// Cart mutations and view
    pub carts: CartService<S>,
    /// Order queries and lifecycle
    pub orders: OrderService<S>,
    /// Gateway payments
    pub payments: PaymentService<S>,
}

impl<S> Clone for Storefront<S> {
    fn clone(&self) -> Self {
        Self {
            commit: self.commit.clone(),
            carts: self.carts.clone(),
            orders: self.orders.clone(),
            payments: self.payments.clone(),
        }
    }
}

impl<S: OrderStore> Storefront<S> {
    /// Wire every service to `store` and `env`.
    #[must_use]
    pub fn new(store: Arc<S>, env: Environment, settings: Settings) -> Self {
        let transit_price = settings.commit.transit_price;
        Self {
            commit: CommitEngine::new(Arc::clone(&store), env.clone(), settings.commit),
            carts: CartService::new(Arc::clone(&store), env.clone()),
            orders: OrderService::new(Arc::clone(&store), env.clone(), transit_price),
            payments: PaymentService::new(store, env, settings.payment),
        }
    }
}
