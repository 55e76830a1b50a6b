//! Builders for test data.

use crate::mocks::test_clock;
use storefront_core::address::Address;
use storefront_core::environment::Clock;
use storefront_core::{
    AddressId, CategoryId, GoodsId, Money, OrderHeader, OrderId, OrderStatus, PayMethod, Sku, SkuId, UserId,
};

/// A SKU with the given stock and price in cents.
#[must_use]
pub fn sku(id: i64, stock: u32, price_cents: u64) -> Sku {
    Sku {
        id: SkuId::new(id),
        goods_id: GoodsId::new(1),
        type_id: CategoryId::new(1),
        name: format!("sku-{id}"),
        unit: "500g".to_string(),
        price: Money::from_cents(price_cents),
        stock,
        sales: 0,
    }
}

/// An address owned by `user_id`.
#[must_use]
pub fn address(id: i64, user_id: UserId) -> Address {
    Address {
        id: AddressId::new(id),
        user_id,
        receiver: "Test Buyer".to_string(),
        addr: "1 Market Street".to_string(),
        zip_code: Some("100000".to_string()),
        phone: "13800000000".to_string(),
        is_default: id == 1,
    }
}

/// An empty gateway order header in [`OrderStatus::Created`].
#[must_use]
pub fn header(order_id: &str) -> OrderHeader {
    OrderHeader {
        order_id: OrderId::new(order_id),
        user_id: UserId::new(1),
        address_id: AddressId::new(1),
        pay_method: PayMethod::Gateway,
        total_count: 0,
        total_price: Money::ZERO,
        transit_price: Money::from_cents(1000),
        status: OrderStatus::Created,
        trade_no: None,
        created_at: test_clock().now(),
    }
}
