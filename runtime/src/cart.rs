//! Cart mutations and the cart page.

use crate::environment::Environment;
use std::sync::Arc;
use storefront_core::cart::parse_quantity;
use storefront_core::store::OrderStore;
use storefront_core::view::{CartView, SkuLineView};
use storefront_core::{CartError, Sku, SkuId, UserId};

/// Validated cart operations.
///
/// Stock checks here are advisory: the cart can still drift from the ledger
/// and the commit engine re-checks everything under compare-and-swap.
pub struct CartService<S> {
    store: Arc<S>,
    env: Environment,
}

impl<S> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            env: self.env.clone(),
        }
    }
}

impl<S: OrderStore> CartService<S> {
    /// Service reading SKUs from `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, env: Environment) -> Self {
        Self { store, env }
    }

    async fn existing_sku(&self, sku_id: SkuId) -> Result<Sku, CartError> {
        self.store
            .find_sku(sku_id)
            .await?
            .ok_or(CartError::SkuNotFound(sku_id))
    }

    /// Add `raw_count` units to whatever the cart already holds.
    ///
    /// Returns the number of distinct SKUs in the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] for an invalid quantity, an unknown SKU, a
    /// total beyond current stock, or a store failure.
    pub async fn add(&self, user_id: UserId, sku_id: SkuId, raw_count: &str) -> Result<usize, CartError> {
        let delta = parse_quantity(raw_count).map_err(|_| CartError::InvalidQuantity(raw_count.to_string()))?;
        let sku = self.existing_sku(sku_id).await?;

        let current = match self.env.carts.get(user_id, sku_id).await? {
            Some(raw) => parse_quantity(&raw).unwrap_or_else(|_| {
                tracing::warn!(user_id = %user_id, sku_id = %sku_id, raw = %raw, "Discarding malformed cart quantity");
                0
            }),
            None => 0,
        };
        let wanted = current
            .checked_add(delta)
            .ok_or_else(|| CartError::InvalidQuantity(raw_count.to_string()))?;

        self.store_quantity(user_id, &sku, wanted).await
    }

    /// Replace the cart quantity of a SKU.
    ///
    /// # Errors
    ///
    /// Same as [`CartService::add`].
    pub async fn replace(&self, user_id: UserId, sku_id: SkuId, raw_count: &str) -> Result<usize, CartError> {
        let quantity = parse_quantity(raw_count).map_err(|_| CartError::InvalidQuantity(raw_count.to_string()))?;
        let sku = self.existing_sku(sku_id).await?;
        self.store_quantity(user_id, &sku, quantity).await
    }

    async fn store_quantity(&self, user_id: UserId, sku: &Sku, quantity: u32) -> Result<usize, CartError> {
        if !sku.can_supply(quantity) {
            return Err(CartError::InsufficientStock {
                sku_id: sku.id,
                wanted: quantity,
                available: sku.stock,
            });
        }

        self.env.carts.set(user_id, sku.id, quantity).await?;
        tracing::debug!(user_id = %user_id, sku_id = %sku.id, quantity, "Cart updated");
        Ok(self.env.carts.count(user_id).await?)
    }

    /// Remove a SKU from the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::SkuNotFound`] for an unknown SKU, or a store
    /// failure.
    pub async fn delete(&self, user_id: UserId, sku_id: SkuId) -> Result<usize, CartError> {
        self.existing_sku(sku_id).await?;
        self.env.carts.remove(user_id, sku_id).await?;
        Ok(self.env.carts.count(user_id).await?)
    }

    /// Number of distinct SKUs in the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Store`] if the cart store fails.
    pub async fn count(&self, user_id: UserId) -> Result<usize, CartError> {
        Ok(self.env.carts.count(user_id).await?)
    }

    /// Cart page with per-line amounts and totals.
    ///
    /// Entries whose SKU no longer exists or whose stored quantity is
    /// malformed are left out.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Store`] on store failure.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, CartError> {
        let entries = self.env.carts.get_all(user_id).await?;
        let mut lines = Vec::with_capacity(entries.len());

        for (sku_id, raw) in entries {
            let Ok(count) = parse_quantity(&raw) else {
                tracing::warn!(user_id = %user_id, sku_id = %sku_id, raw = %raw, "Skipping malformed cart quantity");
                continue;
            };
            match self.store.find_sku(sku_id).await? {
                Some(sku) => lines.push(SkuLineView::new(sku, count)),
                None => tracing::warn!(user_id = %user_id, sku_id = %sku_id, "Skipping unknown sku in cart"),
            }
        }

        Ok(CartView::from_lines(lines))
    }
}
