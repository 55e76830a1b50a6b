//! Order aggregate: header, lines, payment method and the status machine.

use crate::types::{AddressId, Money, OrderId, SkuId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How the buyer settles the order.
///
/// The numeric codes are the values persisted in `order_info.pay_method`
/// and accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayMethod {
    /// Pay the courier on delivery
    CashOnDelivery,
    /// Mobile wallet settled outside the gateway
    MobileWallet,
    /// External payment gateway, confirmed by polling
    Gateway,
    /// Bank transfer
    BankTransfer,
}

impl PayMethod {
    /// All accepted methods, in code order.
    pub const ALL: [Self; 4] = [
        Self::CashOnDelivery,
        Self::MobileWallet,
        Self::Gateway,
        Self::BankTransfer,
    ];

    /// Persisted numeric code.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::CashOnDelivery => 1,
            Self::MobileWallet => 2,
            Self::Gateway => 3,
            Self::BankTransfer => 4,
        }
    }

    /// Parse a persisted numeric code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::CashOnDelivery),
            2 => Some(Self::MobileWallet),
            3 => Some(Self::Gateway),
            4 => Some(Self::BankTransfer),
            _ => None,
        }
    }

    /// Whether payment is confirmed through the external gateway.
    #[must_use]
    pub const fn requires_gateway(self) -> bool {
        matches!(self, Self::Gateway)
    }
}

impl std::str::FromStr for PayMethod {
    type Err = InvalidPayMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<i16>()
            .ok()
            .and_then(Self::from_code)
            .ok_or_else(|| InvalidPayMethod(trimmed.to_string()))
    }
}

/// A pay method string that is not one of the enumerated codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pay method: {0:?}")]
pub struct InvalidPayMethod(pub String);

/// Order lifecycle.
///
/// ```text
/// Created ──► Paid ──► Shipped ──► Delivered ──► Reviewed
///    └──────────────────►┘  (non-gateway pay methods)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Stock reserved, awaiting payment
    Created,
    /// Payment confirmed
    Paid,
    /// Handed to the courier
    Shipped,
    /// Received by the buyer
    Delivered,
    /// Comments submitted (terminal)
    Reviewed,
}

impl OrderStatus {
    /// Persisted numeric code.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Created => 1,
            Self::Paid => 2,
            Self::Shipped => 3,
            Self::Delivered => 4,
            Self::Reviewed => 5,
        }
    }

    /// Parse a persisted numeric code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Created),
            2 => Some(Self::Paid),
            3 => Some(Self::Shipped),
            4 => Some(Self::Delivered),
            5 => Some(Self::Reviewed),
            _ => None,
        }
    }

    /// Human-readable status label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "awaiting payment",
            Self::Paid => "awaiting shipment",
            Self::Shipped => "awaiting delivery",
            Self::Delivered => "awaiting review",
            Self::Reviewed => "completed",
        }
    }

    /// Whether the status machine allows `self -> next` for an order
    /// settled with `pay_method`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self, pay_method: PayMethod) -> bool {
        match (self, next) {
            (Self::Created, Self::Paid) => pay_method.requires_gateway(),
            (Self::Created, Self::Shipped) => !pay_method.requires_gateway(),
            (Self::Paid, Self::Shipped)
            | (Self::Shipped, Self::Delivered)
            | (Self::Delivered, Self::Reviewed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Order record. Totals are written as zero when the header is inserted
/// and finalized in the same transaction once every line is reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    /// Unique order id
    pub order_id: OrderId,
    /// Buyer
    pub user_id: UserId,
    /// Delivery address
    pub address_id: AddressId,
    /// Settlement method
    pub pay_method: PayMethod,
    /// Sum of line counts
    pub total_count: u32,
    /// Sum of line subtotals (excluding shipping)
    pub total_price: Money,
    /// Shipping fee
    pub transit_price: Money,
    /// Lifecycle state
    pub status: OrderStatus,
    /// Gateway trade number, set when payment is confirmed
    pub trade_no: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl OrderHeader {
    /// Amount the buyer pays: goods plus shipping.
    #[must_use]
    pub fn total_pay(&self) -> Money {
        self.total_price + self.transit_price
    }
}

/// One SKU within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Owning order
    pub order_id: OrderId,
    /// Purchased SKU
    pub sku_id: SkuId,
    /// Units purchased
    pub count: u32,
    /// Unit price at the moment the stock was decremented
    pub price: Money,
    /// Post-delivery comment
    pub comment: Option<String>,
}

impl OrderLine {
    /// Line subtotal.
    #[must_use]
    pub const fn amount(&self) -> Money {
        self.price.times(self.count)
    }
}
