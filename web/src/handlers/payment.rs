//! Payment endpoints.
//!
//! - `POST /order/pay` - create the gateway trade, return the pay URL
//! - `POST /order/check` - poll the gateway until the payment settles

use crate::error::AppError;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use storefront_core::store::OrderStore;
use storefront_core::{CommitError, OrderId};
use storefront_runtime::PaymentConfirmation;

/// Request body naming an order.
#[derive(Debug, Default, Deserialize)]
pub struct OrderForm {
    /// Order id
    #[serde(default)]
    pub order_id: Option<String>,
}

impl OrderForm {
    fn order_id(self) -> Result<OrderId, AppError> {
        self.order_id
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(OrderId::new)
            .ok_or_else(|| CommitError::MissingFields("order_id").into())
    }
}

/// Response of `POST /order/pay`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PayResponse {
    /// Where to send the buyer
    pub pay_url: String,
}

/// Start a gateway payment.
///
/// # Errors
///
/// `409 not_payable` unless the order is the user's, uses the gateway and
/// is unpaid; `503`/`502` for gateway failures.
pub async fn pay<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(form): Json<OrderForm>,
) -> Result<Json<PayResponse>, AppError> {
    let order_id = form.order_id()?;
    let pay_url = state.storefront.payments.initiate(user_id, &order_id).await?;
    Ok(Json(PayResponse { pay_url }))
}

/// Wait for the gateway to settle the payment.
///
/// Holds the request open for up to the configured maximum wait.
///
/// # Errors
///
/// `402 payment_declined`, `504 payment_pending` after the maximum wait,
/// or `409 not_payable`.
pub async fn check<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(form): Json<OrderForm>,
) -> Result<Json<PaymentConfirmation>, AppError> {
    let order_id = form.order_id()?;
    Ok(Json(state.storefront.payments.check(user_id, &order_id).await?))
}
