//! Injected dependencies shared by every storefront service.

use crate::ids::{OrderIdGenerator, TimestampIdGenerator};
use std::sync::Arc;
use storefront_core::address::AddressBook;
use storefront_core::cart::CartStore;
use storefront_core::environment::{Clock, SystemClock};
use storefront_core::payment::PaymentGateway;

/// Collaborators reached through trait objects.
///
/// The order store is not part of the environment: services are generic
/// over it because its transaction type is not object safe.
#[derive(Clone)]
pub struct Environment {
    /// Per-user carts
    pub carts: Arc<dyn CartStore>,
    /// Delivery addresses
    pub addresses: Arc<dyn AddressBook>,
    /// External payment gateway
    pub gateway: Arc<dyn PaymentGateway>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Order id source
    pub ids: Arc<dyn OrderIdGenerator>,
}

impl Environment {
    /// Environment with the system clock and the default id generator.
    #[must_use]
    pub fn new(
        carts: Arc<dyn CartStore>,
        addresses: Arc<dyn AddressBook>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            carts,
            addresses,
            gateway,
            clock: Arc::new(SystemClock),
            ids: Arc::new(TimestampIdGenerator::new()),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the id generator.
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn OrderIdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}
