//! # Storefront Testing
//!
//! Test doubles for the storefront collaborator traits.
//!
//! This crate provides:
//! - [`InMemoryOrderStore`]: ledger, order aggregate and task outbox with
//!   private writes, row locks, forced compare-and-swap misses and a read
//!   gate for deterministic races
//! - [`InMemoryCartStore`]: cart hash with failure injection
//! - [`InMemoryAddressBook`], [`ScriptedPaymentGateway`]
//! - [`mocks::FixedClock`] and [`fixtures`] builders
//!
//! ## Example
//!
//! ```ignore
//! use storefront_testing::{InMemoryOrderStore, fixtures::sku};
//!
//! #[tokio::test]
//! async fn two_buyers_race_for_the_last_units() {
//!     let store = InMemoryOrderStore::with_skus([sku(7, 5, 1000)]);
//!     store.gate_first_reads(2).unwrap();
//!     // spawn two commits of 3 units each...
//! }
//! ```

use chrono::{DateTime, Utc};
use storefront_core::environment::Clock;

mod cart_store;
mod collaborators;
pub mod fixtures;
mod order_store;

pub use cart_store::InMemoryCartStore;
pub use collaborators::{InMemoryAddressBook, InitiatedPayment, ScriptedPaymentGateway};
pub use order_store::{InMemoryOrderStore, InMemoryTransaction};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_testing::mocks::FixedClock;
    /// use storefront_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}
