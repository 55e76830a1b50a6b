//! Read-side view models.
//!
//! Display-only values (line amounts, totals, status names) are computed
//! here from stored records and never persisted.

use crate::address::Address;
use crate::order::{OrderHeader, OrderLine};
use crate::sku::Sku;
use crate::types::Money;
use serde::Serialize;

/// A SKU paired with a requested quantity (cart page and order preview).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkuLineView {
    /// The SKU as currently stored
    pub sku: Sku,
    /// Requested units
    pub count: u32,
    /// `sku.price * count`
    pub amount: Money,
}

impl SkuLineView {
    /// Build a line at the SKU's current price.
    #[must_use]
    pub fn new(sku: Sku, count: u32) -> Self {
        let amount = sku.price.times(count);
        Self { sku, count, amount }
    }
}

fn totals(lines: &[SkuLineView]) -> (u32, Money) {
    lines.iter().fold((0u32, Money::ZERO), |(count, price), line| {
        (count.saturating_add(line.count), price + line.amount)
    })
}

/// Cart page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    /// One line per cart entry
    pub lines: Vec<SkuLineView>,
    /// Sum of counts
    pub total_count: u32,
    /// Sum of amounts
    pub total_price: Money,
}

impl CartView {
    /// Compute totals over `lines`.
    #[must_use]
    pub fn from_lines(lines: Vec<SkuLineView>) -> Self {
        let (total_count, total_price) = totals(&lines);
        Self {
            lines,
            total_count,
            total_price,
        }
    }
}

/// Checkout preview shown before commit. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacePreview {
    /// Lines at current prices
    pub lines: Vec<SkuLineView>,
    /// Sum of counts
    pub total_count: u32,
    /// Sum of amounts
    pub total_price: Money,
    /// Shipping fee
    pub transit_price: Money,
    /// `total_price + transit_price`
    pub total_pay: Money,
    /// Buyer's addresses to choose from
    pub addresses: Vec<Address>,
}

impl PlacePreview {
    /// Compute totals over `lines`.
    #[must_use]
    pub fn new(lines: Vec<SkuLineView>, transit_price: Money, addresses: Vec<Address>) -> Self {
        let (total_count, total_price) = totals(&lines);
        Self {
            lines,
            total_count,
            total_price,
            transit_price,
            total_pay: total_price + transit_price,
            addresses,
        }
    }
}

/// An order line with its subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineView {
    /// Stored line
    pub line: OrderLine,
    /// `line.price * line.count`
    pub amount: Money,
}

impl From<OrderLine> for OrderLineView {
    fn from(line: OrderLine) -> Self {
        let amount = line.amount();
        Self { line, amount }
    }
}

/// Order detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetailView {
    /// Stored header
    pub header: OrderHeader,
    /// Human-readable status
    pub status_name: &'static str,
    /// Lines with subtotals
    pub lines: Vec<OrderLineView>,
    /// Goods plus shipping
    pub total_pay: Money,
}

impl OrderDetailView {
    /// Assemble the view from a header and its lines.
    #[must_use]
    pub fn new(header: OrderHeader, lines: Vec<OrderLine>) -> Self {
        Self {
            status_name: header.status.label(),
            total_pay: header.total_pay(),
            lines: lines.into_iter().map(OrderLineView::from).collect(),
            header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryId, GoodsId, SkuId};

    fn sku(id: i64, cents: u64) -> Sku {
        Sku {
            id: SkuId::new(id),
            goods_id: GoodsId::new(1),
            type_id: CategoryId::new(1),
            name: format!("sku-{id}"),
            unit: "500g".to_string(),
            price: Money::from_cents(cents),
            stock: 10,
            sales: 0,
        }
    }

    #[test]
    fn preview_adds_transit_price() {
        let lines = vec![SkuLineView::new(sku(1, 350), 2), SkuLineView::new(sku(2, 1000), 1)];
        let preview = PlacePreview::new(lines, Money::from_cents(1000), Vec::new());

        assert_eq!(preview.total_count, 3);
        assert_eq!(preview.total_price, Money::from_cents(1700));
        assert_eq!(preview.total_pay, Money::from_cents(2700));
    }

    #[test]
    fn empty_cart_has_zero_totals() {
        let view = CartView::from_lines(Vec::new());
        assert_eq!(view.total_count, 0);
        assert!(view.total_price.is_zero());
    }
}
