//! Shared harness for runtime integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use storefront_core::task::Task;
use storefront_core::{AddressId, PayMethod, SkuId, UserId};
use storefront_runtime::retry::RetryPolicy;
use storefront_runtime::{
    CommitItem, CommitRequest, CommitSettings, Environment, PaymentSettings, RelaySettings, Settings, Storefront,
};
use storefront_testing::fixtures::{address, sku};
use storefront_testing::mocks::test_clock;
use storefront_testing::{InMemoryAddressBook, InMemoryCartStore, InMemoryOrderStore, ScriptedPaymentGateway};

pub const BUYER: UserId = UserId::new(1);
pub const OTHER_BUYER: UserId = UserId::new(2);
pub const BUYER_ADDRESS: AddressId = AddressId::new(1);

/// Storefront over in-memory doubles, with handles on every double.
pub struct Harness {
    pub storefront: Storefront<InMemoryOrderStore>,
    pub store: InMemoryOrderStore,
    pub carts: InMemoryCartStore,
    pub addresses: InMemoryAddressBook,
    pub gateway: ScriptedPaymentGateway,
}

pub fn fast_settings() -> Settings {
    Settings {
        commit: CommitSettings {
            retry: RetryPolicy::builder()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(5))
                .jitter(true)
                .build(),
            ..CommitSettings::default()
        },
        payment: PaymentSettings {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(30),
            ..PaymentSettings::default()
        },
        relay: RelaySettings::default(),
    }
}

impl Harness {
    /// Harness whose ledger holds `(sku_id, stock, price_cents)` SKUs.
    pub fn with_skus(skus: &[(i64, u32, u64)]) -> Self {
        Self::with_gateway(skus, ScriptedPaymentGateway::new())
    }

    pub fn with_gateway(skus: &[(i64, u32, u64)], gateway: ScriptedPaymentGateway) -> Self {
        let store = InMemoryOrderStore::with_skus(skus.iter().map(|&(id, stock, price)| sku(id, stock, price)));
        let carts = InMemoryCartStore::new();
        let addresses = InMemoryAddressBook::new();
        addresses.add(address(1, BUYER)).unwrap();
        addresses.add(address(2, OTHER_BUYER)).unwrap();

        let env = Environment::new(
            Arc::new(carts.clone()),
            Arc::new(addresses.clone()),
            Arc::new(gateway.clone()),
        )
        .with_clock(Arc::new(test_clock()));

        Self {
            storefront: Storefront::new(Arc::new(store.clone()), env, fast_settings()),
            store,
            carts,
            addresses,
            gateway,
        }
    }

    pub fn stock(&self, sku_id: i64) -> (u32, u32) {
        let sku = self.store.sku(SkuId::new(sku_id)).unwrap();
        (sku.stock, sku.sales)
    }

    /// Tasks waiting in the outbox, oldest first.
    pub fn outbox(&self) -> Vec<Task> {
        self.store.pending_tasks().into_iter().map(|pending| pending.task).collect()
    }
}

/// Request buying `(sku_id, quantity)` pairs directly.
pub fn direct(pay_method: PayMethod, items: &[(i64, &str)]) -> CommitRequest {
    CommitRequest {
        user_id: BUYER,
        address_id: BUYER_ADDRESS,
        pay_method,
        items: items
            .iter()
            .map(|&(id, qty)| CommitItem::direct(SkuId::new(id), qty))
            .collect(),
    }
}

/// Request buying `sku_ids` with quantities taken from the cart.
pub fn from_cart(pay_method: PayMethod, sku_ids: &[i64]) -> CommitRequest {
    CommitRequest {
        user_id: BUYER,
        address_id: BUYER_ADDRESS,
        pay_method,
        items: sku_ids.iter().map(|&id| CommitItem::from_cart(SkuId::new(id))).collect(),
    }
}
