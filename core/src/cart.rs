//! Cart store abstraction.
//!
//! The cart lives in a fast key-value store (a Redis hash per user in
//! production). It offers no transactional guarantees; quantities are kept
//! as raw strings and validated whenever they are read back.

use crate::BoxFuture;
use crate::error::StoreError;
use crate::types::{SkuId, UserId};
use std::collections::BTreeMap;
use thiserror::Error;

/// Key-value key holding a user's cart.
#[must_use]
pub fn cart_key(user_id: UserId) -> String {
    format!("cart_{user_id}")
}

/// Per-user mapping SKU → desired quantity.
///
/// All operations are scoped to a single user. Store unavailability is
/// reported as [`StoreError::Unavailable`].
pub trait CartStore: Send + Sync {
    /// Upsert the quantity for a SKU (last write wins).
    fn set(&self, user_id: UserId, sku_id: SkuId, quantity: u32)
    -> BoxFuture<'_, Result<(), StoreError>>;

    /// Raw stored quantity for a SKU, if any.
    fn get(&self, user_id: UserId, sku_id: SkuId)
    -> BoxFuture<'_, Result<Option<String>, StoreError>>;

    /// Every entry of the user's cart.
    fn get_all(&self, user_id: UserId) -> BoxFuture<'_, Result<BTreeMap<SkuId, String>, StoreError>>;

    /// Remove one SKU.
    fn remove(&self, user_id: UserId, sku_id: SkuId) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Remove several SKUs in one round trip.
    fn remove_many(&self, user_id: UserId, sku_ids: Vec<SkuId>)
    -> BoxFuture<'_, Result<(), StoreError>>;

    /// Number of distinct SKUs in the cart.
    fn count(&self, user_id: UserId) -> BoxFuture<'_, Result<usize, StoreError>>;
}

/// Why a quantity string was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// Not an integer
    #[error("quantity is not a number")]
    NotANumber,
    /// Zero or negative
    #[error("quantity must be positive")]
    NotPositive,
    /// Larger than the ledger can represent
    #[error("quantity is too large")]
    TooLarge,
}

/// Parse a quantity as submitted by a form or stored in the cart.
///
/// # Errors
///
/// Returns [`QuantityError`] unless `raw` is a positive integer that fits
/// in `u32`.
pub fn parse_quantity(raw: &str) -> Result<u32, QuantityError> {
    let value: i64 = raw.trim().parse().map_err(|_| QuantityError::NotANumber)?;
    if value <= 0 {
        return Err(QuantityError::NotPositive);
    }
    u32::try_from(value).map_err(|_| QuantityError::TooLarge)
}
