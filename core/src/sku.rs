//! Stock-keeping units as stored in the inventory ledger.

use crate::types::{CategoryId, GoodsId, Money, SkuId};
use serde::{Deserialize, Serialize};

/// A purchasable variant of a product with its own price and counters.
///
/// `stock` and `sales` are only ever changed through the conditional
/// decrement of an [`OrderTransaction`](crate::store::OrderTransaction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    /// SKU identity
    pub id: SkuId,
    /// Product family
    pub goods_id: GoodsId,
    /// Category
    pub type_id: CategoryId,
    /// Display name
    pub name: String,
    /// Sales unit (e.g. "500g")
    pub unit: String,
    /// Current unit price
    pub price: Money,
    /// Units available for sale, never negative
    pub stock: u32,
    /// Units sold so far, never decreases
    pub sales: u32,
}

impl Sku {
    /// Whether `quantity` units can be taken from the current stock.
    #[must_use]
    pub const fn can_supply(&self, quantity: u32) -> bool {
        quantity <= self.stock
    }
}
