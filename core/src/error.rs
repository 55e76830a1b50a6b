//! Error taxonomy for the storefront.
//!
//! Errors are grouped by the layer that raises them. Every error that can
//! reach a buyer maps to a stable [`RejectReason`] code plus its `Display`
//! message.

use crate::order::{InvalidPayMethod, OrderStatus};
use crate::payment::GatewayError;
use crate::types::{AddressId, OrderId, SkuId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Infrastructure failures raised by store implementations.
///
/// These are never business outcomes: a caller seeing one of these must
/// treat the operation as failed, not as rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached (transient).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A query or statement failed.
    #[error("database error: {0}")]
    Database(String),

    /// A unique key already exists.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// A persisted row could not be mapped back to a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Stable reason codes returned to callers of the commit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No authenticated user on the request
    NotAuthenticated,
    /// A required field is absent or empty
    MissingFields,
    /// Pay method is not an enumerated value
    InvalidPayMethod,
    /// Address missing or owned by someone else
    InvalidAddress,
    /// Quantity is non-numeric or not positive
    InvalidQuantity,
    /// A requested SKU does not exist
    SkuNotFound,
    /// Requested quantity exceeds current stock
    InsufficientStock,
    /// Lost the stock race too many times
    ContentionExhausted,
    /// Storage or transaction failure
    PersistenceError,
}

impl RejectReason {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::MissingFields => "missing_fields",
            Self::InvalidPayMethod => "invalid_pay_method",
            Self::InvalidAddress => "invalid_address",
            Self::InvalidQuantity => "invalid_quantity",
            Self::SkuNotFound => "sku_not_found",
            Self::InsufficientStock => "insufficient_stock",
            Self::ContentionExhausted => "contention_exhausted",
            Self::PersistenceError => "persistence_error",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a commit was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    // ═══════════════════════════════════════════════════════════
    // Validation (before any persistence)
    // ═══════════════════════════════════════════════════════════

    /// No authenticated user.
    #[error("user is not logged in")]
    NotAuthenticated,

    /// A required field is absent or empty.
    #[error("incomplete request: missing {0}")]
    MissingFields(&'static str),

    /// Pay method is not one of the enumerated values.
    #[error(transparent)]
    InvalidPayMethod(#[from] InvalidPayMethod),

    /// Address does not exist or belongs to another user.
    #[error("invalid address {0}")]
    InvalidAddress(AddressId),

    /// Quantity is missing, non-numeric or not positive.
    #[error("invalid quantity {raw:?} for sku {sku_id}")]
    InvalidQuantity {
        /// SKU whose quantity was rejected
        sku_id: SkuId,
        /// Raw value as received or stored
        raw: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Business rules (transaction rolled back)
    // ═══════════════════════════════════════════════════════════

    /// SKU does not exist.
    #[error("sku {0} does not exist")]
    SkuNotFound(SkuId),

    /// Requested quantity exceeds the stock read at decision time.
    #[error("insufficient stock for sku {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Offending SKU
        sku_id: SkuId,
        /// Units requested
        requested: u32,
        /// Units in stock when the decision was made
        available: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Contention (transaction rolled back, caller may resubmit)
    // ═══════════════════════════════════════════════════════════

    /// Every conditional decrement attempt lost to a concurrent commit.
    #[error("sku {sku_id} is busy after {attempts} attempts, please try again")]
    ContentionExhausted {
        /// Contended SKU
        sku_id: SkuId,
        /// Attempts made
        attempts: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════

    /// A line subtotal or the order total does not fit the amount type.
    #[error("order total out of range at sku {0}")]
    TotalOverflow(SkuId),

    /// Storage or transaction failure.
    #[error("order could not be placed: {0}")]
    Persistence(#[from] StoreError),
}

impl CommitError {
    /// Stable reason code for this error.
    #[must_use]
    pub const fn reason(&self) -> RejectReason {
        match self {
            Self::NotAuthenticated => RejectReason::NotAuthenticated,
            Self::MissingFields(_) => RejectReason::MissingFields,
            Self::InvalidPayMethod(_) => RejectReason::InvalidPayMethod,
            Self::InvalidAddress(_) => RejectReason::InvalidAddress,
            Self::InvalidQuantity { .. } => RejectReason::InvalidQuantity,
            Self::SkuNotFound(_) => RejectReason::SkuNotFound,
            Self::InsufficientStock { .. } => RejectReason::InsufficientStock,
            Self::ContentionExhausted { .. } => RejectReason::ContentionExhausted,
            Self::TotalOverflow(_) | Self::Persistence(_) => RejectReason::PersistenceError,
        }
    }

    /// SKU that caused the rejection, when one did.
    #[must_use]
    pub const fn sku_id(&self) -> Option<SkuId> {
        match self {
            Self::InvalidQuantity { sku_id, .. }
            | Self::InsufficientStock { sku_id, .. }
            | Self::ContentionExhausted { sku_id, .. } => Some(*sku_id),
            Self::SkuNotFound(sku_id) | Self::TotalOverflow(sku_id) => Some(*sku_id),
            _ => None,
        }
    }

    /// Returns `true` for failures detected before the transaction opened.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::MissingFields(_)
                | Self::InvalidPayMethod(_)
                | Self::InvalidAddress(_)
                | Self::InvalidQuantity { .. }
        )
    }
}

/// Cart mutation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// SKU does not exist.
    #[error("sku {0} does not exist")]
    SkuNotFound(SkuId),

    /// Quantity is non-numeric or not positive.
    #[error("invalid quantity {0:?}")]
    InvalidQuantity(String),

    /// Resulting cart quantity would exceed current stock.
    #[error("insufficient stock for sku {sku_id}: wanted {wanted}, available {available}")]
    InsufficientStock {
        /// SKU
        sku_id: SkuId,
        /// Quantity the cart would hold
        wanted: u32,
        /// Current stock
        available: u32,
    },

    /// Cart or inventory store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of post-commit order operations (views, fulfilment, comments).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Order does not exist or belongs to another user.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The status machine does not allow this step.
    #[error("order {order_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// Order
        order_id: OrderId,
        /// Current status
        from: OrderStatus,
        /// Requested status
        to: OrderStatus,
    },

    /// A SKU referenced by the request does not exist.
    #[error("sku {0} does not exist")]
    SkuNotFound(SkuId),

    /// Quantity is non-numeric or not positive.
    #[error("invalid quantity {raw:?} for sku {sku_id}")]
    InvalidQuantity {
        /// SKU
        sku_id: SkuId,
        /// Raw value
        raw: String,
    },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Payment initiation and confirmation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// No payable order with this id for this user.
    #[error("order {0} is not awaiting gateway payment")]
    NotPayable(OrderId),

    /// The gateway reported a definitive failure.
    #[error("payment for order {order_id} failed: {detail}")]
    Declined {
        /// Order
        order_id: OrderId,
        /// Gateway detail
        detail: String,
    },

    /// Polling exceeded its maximum wait while the payment was pending.
    #[error("payment for order {0} still pending after the maximum wait")]
    TimedOut(OrderId),

    /// Gateway transport failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_serialize_to_snake_case_codes() {
        let json = serde_json::to_string(&RejectReason::ContentionExhausted).unwrap_or_default();
        assert_eq!(json, "\"contention_exhausted\"");
        assert_eq!(RejectReason::SkuNotFound.as_str(), "sku_not_found");
    }

    #[test]
    fn insufficient_stock_names_the_sku() {
        let err = CommitError::InsufficientStock {
            sku_id: SkuId::new(7),
            requested: 3,
            available: 2,
        };
        assert_eq!(err.reason(), RejectReason::InsufficientStock);
        assert_eq!(err.sku_id(), Some(SkuId::new(7)));
        assert!(err.to_string().contains("sku 7"));
        assert!(!err.is_validation());
    }

    #[test]
    fn contention_is_distinct_from_insufficient_stock() {
        let err = CommitError::ContentionExhausted {
            sku_id: SkuId::new(7),
            attempts: 3,
        };
        assert_eq!(err.reason(), RejectReason::ContentionExhausted);
        assert_ne!(err.reason(), RejectReason::InsufficientStock);
    }

    #[test]
    fn store_errors_map_to_persistence() {
        let err: CommitError = StoreError::Database("deadlock".into()).into();
        assert_eq!(err.reason(), RejectReason::PersistenceError);
        assert_eq!(err.sku_id(), None);
    }
}
