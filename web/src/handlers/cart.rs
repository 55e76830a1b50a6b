//! Cart endpoints.
//!
//! - `POST /cart/add` - add units to the cart
//! - `POST /cart/update` - replace a cart quantity
//! - `POST /cart/delete` - remove a SKU from the cart
//! - `GET /cart` - cart page with totals
//!
//! Quantities are passed through as strings so the cart service can
//! reject malformed values with `invalid_quantity`.

use crate::error::AppError;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use storefront_core::store::OrderStore;
use storefront_core::view::CartView;
use storefront_core::{CommitError, SkuId};

/// Request body of the cart mutations.
#[derive(Debug, Default, Deserialize)]
pub struct CartForm {
    /// SKU id
    #[serde(default)]
    pub sku_id: Option<String>,
    /// Units (absent for delete)
    #[serde(default)]
    pub count: Option<String>,
}

impl CartForm {
    fn sku_id(&self) -> Result<SkuId, AppError> {
        self.sku_id
            .as_deref()
            .and_then(|raw| raw.parse::<SkuId>().ok())
            .ok_or_else(|| CommitError::MissingFields("sku_id").into())
    }

    fn count(&self) -> Result<&str, AppError> {
        self.count
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .ok_or_else(|| CommitError::MissingFields("count").into())
    }
}

/// Response of the cart mutations.
#[derive(Debug, Serialize, Deserialize)]
pub struct CartCountResponse {
    /// Distinct SKUs in the cart
    pub cart_count: usize,
}

/// Add `count` units of `sku_id` to the cart.
///
/// # Errors
///
/// `missing_fields`, `invalid_quantity`, `sku_not_found` or
/// `insufficient_stock` (the cart total may not exceed stock).
pub async fn add<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(form): Json<CartForm>,
) -> Result<Json<CartCountResponse>, AppError> {
    let sku_id = form.sku_id()?;
    let cart_count = state.storefront.carts.add(user_id, sku_id, form.count()?).await?;
    Ok(Json(CartCountResponse { cart_count }))
}

/// Replace the cart quantity of `sku_id`.
///
/// # Errors
///
/// Same as [`add`].
pub async fn update<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(form): Json<CartForm>,
) -> Result<Json<CartCountResponse>, AppError> {
    let sku_id = form.sku_id()?;
    let cart_count = state
        .storefront
        .carts
        .replace(user_id, sku_id, form.count()?)
        .await?;
    Ok(Json(CartCountResponse { cart_count }))
}

/// Remove `sku_id` from the cart.
///
/// # Errors
///
/// `missing_fields` or `sku_not_found`.
pub async fn delete<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(form): Json<CartForm>,
) -> Result<Json<CartCountResponse>, AppError> {
    let cart_count = state.storefront.carts.delete(user_id, form.sku_id()?).await?;
    Ok(Json(CartCountResponse { cart_count }))
}

/// Cart page.
///
/// # Errors
///
/// Fails only if the cart store does.
pub async fn view<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(state.storefront.carts.view(user_id).await?))
}
