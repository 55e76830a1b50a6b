//! Read side (previews, details, history) and post-commit lifecycle of
//! orders.

use crate::environment::Environment;
use std::sync::Arc;
use storefront_core::cart::parse_quantity;
use storefront_core::store::{OrderStore, OrderTransaction};
use storefront_core::view::{OrderDetailView, PlacePreview, SkuLineView};
use storefront_core::{Money, OrderError, OrderHeader, OrderId, OrderStatus, SkuId, UserId};

/// Order previews, details, history, comments and fulfilment transitions.
pub struct OrderService<S> {
    store: Arc<S>,
    env: Environment,
    transit_price: Money,
}

impl<S> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            env: self.env.clone(),
            transit_price: self.transit_price,
        }
    }
}

impl<S: OrderStore> OrderService<S> {
    /// Service over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, env: Environment, transit_price: Money) -> Self {
        Self {
            store,
            env,
            transit_price,
        }
    }

    /// Checkout preview at current prices. Read-only.
    ///
    /// `explicit` is a direct-buy quantity and only applies when a single
    /// SKU is previewed; otherwise quantities come from the cart.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::SkuNotFound`] or [`OrderError::InvalidQuantity`]
    /// for the first offending SKU, or a store failure.
    pub async fn place_preview(
        &self,
        user_id: UserId,
        sku_ids: &[SkuId],
        explicit: Option<&str>,
    ) -> Result<PlacePreview, OrderError> {
        let explicit = if sku_ids.len() == 1 { explicit } else { None };
        let mut lines = Vec::with_capacity(sku_ids.len());

        for &sku_id in sku_ids {
            let sku = self
                .store
                .find_sku(sku_id)
                .await?
                .ok_or(OrderError::SkuNotFound(sku_id))?;

            let raw = match explicit {
                Some(raw) => raw.to_string(),
                None => self.env.carts.get(user_id, sku_id).await?.unwrap_or_default(),
            };
            let count = parse_quantity(&raw).map_err(|_| OrderError::InvalidQuantity { sku_id, raw })?;

            lines.push(SkuLineView::new(sku, count));
        }

        let addresses = self.env.addresses.list(user_id).await?;
        Ok(PlacePreview::new(lines, self.transit_price, addresses))
    }

    async fn owned_order(&self, user_id: UserId, order_id: &OrderId) -> Result<OrderHeader, OrderError> {
        self.store
            .find_order(order_id)
            .await?
            .filter(|header| header.user_id == user_id)
            .ok_or_else(|| OrderError::NotFound(order_id.clone()))
    }

    /// Order with its lines, as seen by its owner.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] for unknown orders and for orders
    /// of other users.
    pub async fn detail(&self, user_id: UserId, order_id: &OrderId) -> Result<OrderDetailView, OrderError> {
        let header = self.owned_order(user_id, order_id).await?;
        let lines = self.store.order_lines(order_id).await?;
        Ok(OrderDetailView::new(header, lines))
    }

    /// Order history of a user, newest first, each order with its lines.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<OrderDetailView>, OrderError> {
        let headers = self.store.orders_for_user(user_id).await?;
        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let lines = self.store.order_lines(&header.order_id).await?;
            orders.push(OrderDetailView::new(header, lines));
        }
        tracing::debug!(user_id = %user_id, orders = orders.len(), "Order history loaded");
        Ok(orders)
    }

    /// Store per-line comments and close the order.
    ///
    /// Comments for SKUs that are not in the order, or that are blank, are
    /// skipped. Returns how many lines were commented.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] unless the order is
    /// delivered, [`OrderError::NotFound`] if it is not the user's.
    pub async fn comment(
        &self,
        user_id: UserId,
        order_id: &OrderId,
        comments: Vec<(SkuId, String)>,
    ) -> Result<usize, OrderError> {
        let header = self.owned_order(user_id, order_id).await?;
        if header.status != OrderStatus::Delivered {
            return Err(OrderError::InvalidTransition {
                order_id: order_id.clone(),
                from: header.status,
                to: OrderStatus::Reviewed,
            });
        }

        let mut tx = self.store.begin().await?;
        match Self::write_comments(&mut tx, order_id, &comments).await {
            Ok(Some(stored)) => {
                tx.commit().await?;
                tracing::info!(order_id = %order_id, stored, "Order reviewed");
                Ok(stored)
            }
            Ok(None) => {
                tx.rollback().await?;
                Err(OrderError::InvalidTransition {
                    order_id: order_id.clone(),
                    from: header.status,
                    to: OrderStatus::Reviewed,
                })
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(order_id = %order_id, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// `Ok(None)` when the order left `Delivered` concurrently.
    async fn write_comments(
        tx: &mut S::Transaction,
        order_id: &OrderId,
        comments: &[(SkuId, String)],
    ) -> Result<Option<usize>, OrderError> {
        let mut stored = 0;
        for (sku_id, text) in comments {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if tx.set_comment(order_id, *sku_id, text).await? {
                stored += 1;
            } else {
                tracing::debug!(order_id = %order_id, sku_id = %sku_id, "No such line, comment skipped");
            }
        }

        if tx
            .advance_status(order_id, OrderStatus::Delivered, OrderStatus::Reviewed, None)
            .await?
        {
            Ok(Some(stored))
        } else {
            Ok(None)
        }
    }

    /// Hand the order to the courier.
    ///
    /// Gateway orders must be paid first; other orders ship straight from
    /// [`OrderStatus::Created`].
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] if the order is not in a
    /// shippable state.
    pub async fn mark_shipped(&self, order_id: &OrderId) -> Result<OrderHeader, OrderError> {
        self.advance(order_id, OrderStatus::Shipped).await
    }

    /// Record delivery of a shipped order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] unless the order is shipped.
    pub async fn mark_delivered(&self, order_id: &OrderId) -> Result<OrderHeader, OrderError> {
        self.advance(order_id, OrderStatus::Delivered).await
    }

    async fn advance(&self, order_id: &OrderId, to: OrderStatus) -> Result<OrderHeader, OrderError> {
        let mut header = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.clone()))?;

        let from = header.status;
        let invalid = || OrderError::InvalidTransition {
            order_id: order_id.clone(),
            from,
            to,
        };

        if !from.can_advance_to(to, header.pay_method) {
            return Err(invalid());
        }
        if !self.store.advance_status(order_id, from, to, None).await? {
            return Err(invalid());
        }

        tracing::info!(order_id = %order_id, from = ?from, to = ?to, "Order status advanced");
        header.status = to;
        Ok(header)
    }
}
