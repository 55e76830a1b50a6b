//! Payment gateway abstraction.
//!
//! The gateway itself is an external system. This module only fixes the
//! shape of the two calls the storefront makes and how a trade query is
//! interpreted.

use crate::BoxFuture;
use crate::types::{Money, OrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway API code for a processed request.
pub const CODE_SUCCESS: &str = "10000";
/// Gateway API code for "not yet available, ask again later".
pub const CODE_PROCESSING: &str = "40004";
/// Trade status of a settled trade.
pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";
/// Trade status of a trade created but not paid yet.
pub const WAIT_BUYER_PAY: &str = "WAIT_BUYER_PAY";

/// Gateway transport or protocol failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network failure or gateway unavailable (transient).
    #[error("gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with something we cannot interpret.
    #[error("unexpected gateway response: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Whether the call may succeed if repeated.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Raw answer to a trade query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuery {
    /// API status code
    pub code: String,
    /// Trade status, when the trade exists
    #[serde(default)]
    pub trade_status: Option<String>,
    /// Gateway trade number, when paid
    #[serde(default)]
    pub trade_no: Option<String>,
}

/// Interpreted payment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Not settled yet; ask again later
    Pending,
    /// Settled
    Success {
        /// Gateway trade number
        trade_no: String,
    },
    /// Definitive failure
    Failed {
        /// Gateway code and trade status
        detail: String,
    },
}

impl TradeQuery {
    /// Map the raw answer to a [`PaymentStatus`].
    #[must_use]
    pub fn status(&self) -> PaymentStatus {
        let trade_status = self.trade_status.as_deref();
        match (self.code.as_str(), trade_status) {
            (CODE_SUCCESS, Some(TRADE_SUCCESS)) => match &self.trade_no {
                Some(trade_no) if !trade_no.is_empty() => PaymentStatus::Success {
                    trade_no: trade_no.clone(),
                },
                _ => PaymentStatus::Failed {
                    detail: "settled trade without trade number".to_string(),
                },
            },
            (CODE_PROCESSING, _) | (CODE_SUCCESS, Some(WAIT_BUYER_PAY)) => PaymentStatus::Pending,
            (code, status) => PaymentStatus::Failed {
                detail: format!("code={code} trade_status={}", status.unwrap_or("-")),
            },
        }
    }
}

/// External payment gateway.
pub trait PaymentGateway: Send + Sync {
    /// Create a page-pay trade and return the URL the buyer is sent to.
    fn initiate_payment(
        &self,
        order_id: &OrderId,
        amount: Money,
        description: &str,
    ) -> BoxFuture<'_, Result<String, GatewayError>>;

    /// Query the trade created for `order_id`.
    fn query_payment(&self, order_id: &OrderId) -> BoxFuture<'_, Result<TradeQuery, GatewayError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(code: &str, status: Option<&str>, trade_no: Option<&str>) -> TradeQuery {
        TradeQuery {
            code: code.to_string(),
            trade_status: status.map(str::to_string),
            trade_no: trade_no.map(str::to_string),
        }
    }

    #[test]
    fn settled_trade_is_success() {
        assert_eq!(
            query(CODE_SUCCESS, Some(TRADE_SUCCESS), Some("2017032121001004070200176844")).status(),
            PaymentStatus::Success {
                trade_no: "2017032121001004070200176844".to_string()
            }
        );
    }

    #[test]
    fn waiting_or_processing_is_pending() {
        assert_eq!(query(CODE_PROCESSING, None, None).status(), PaymentStatus::Pending);
        assert_eq!(
            query(CODE_SUCCESS, Some(WAIT_BUYER_PAY), None).status(),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn anything_else_is_failed() {
        assert!(matches!(
            query("20000", None, None).status(),
            PaymentStatus::Failed { .. }
        ));
        assert!(matches!(
            query(CODE_SUCCESS, Some("TRADE_CLOSED"), None).status(),
            PaymentStatus::Failed { .. }
        ));
    }
}
