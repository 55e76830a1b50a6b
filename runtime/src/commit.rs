//! Order commit engine.
//!
//! Turns a buyer's selection into a durable order:
//!
//! 1. validate the request and resolve every quantity (no persistence yet)
//! 2. open a transaction and insert the header with zero totals
//! 3. per SKU in ascending id order, reserve stock with a bounded compare-and-swap loop and insert
//!    the line at the price read in the winning cycle
//! 4. finalize totals, record the `OrderPlaced` outbox row and commit
//! 5. only then drop the consumed cart entries
//!
//! Any failure in 2–4 rolls the whole transaction back, outbox row
//! included. Step 5 never turns a committed order into a failure.

use crate::environment::Environment;
use crate::metrics::CommitMetrics;
use crate::retry::{Attempt, OptimisticError, RetryPolicy, retry_optimistic};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use storefront_core::cart::parse_quantity;
use storefront_core::store::{OrderStore, OrderTransaction};
use storefront_core::task::Task;
use storefront_core::{
    AddressId, CommitError, Money, OrderHeader, OrderId, OrderLine, OrderStatus, PayMethod, SkuId, UserId,
};
use tracing::Instrument;

/// Shipping fee charged on every order.
pub const DEFAULT_TRANSIT_PRICE: Money = Money::from_cents(1000);

/// Commit engine tuning.
#[derive(Debug, Clone)]
pub struct CommitSettings {
    /// Bound and backoff of the per-SKU compare-and-swap loop
    pub retry: RetryPolicy,
    /// Shipping fee written on every header
    pub transit_price: Money,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::optimistic(),
            transit_price: DEFAULT_TRANSIT_PRICE,
        }
    }
}

/// One SKU of a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitItem {
    /// SKU to buy
    pub sku_id: SkuId,
    /// Explicit quantity (direct buy). `None` reads it from the cart.
    pub quantity: Option<String>,
}

impl CommitItem {
    /// Item whose quantity comes from the cart.
    #[must_use]
    pub const fn from_cart(sku_id: SkuId) -> Self {
        Self {
            sku_id,
            quantity: None,
        }
    }

    /// Item with an explicit quantity.
    #[must_use]
    pub fn direct(sku_id: SkuId, quantity: impl Into<String>) -> Self {
        Self {
            sku_id,
            quantity: Some(quantity.into()),
        }
    }
}

/// A validated commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// Buyer
    pub user_id: UserId,
    /// Delivery address, must belong to the buyer
    pub address_id: AddressId,
    /// Settlement method
    pub pay_method: PayMethod,
    /// SKUs to buy, in order
    pub items: Vec<CommitItem>,
}

/// Commit request as submitted by the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct CommitForm {
    /// Address id
    #[serde(default)]
    pub addr_id: Option<String>,
    /// Pay method code
    #[serde(default)]
    pub pay_method: Option<String>,
    /// Comma-separated SKU ids
    #[serde(default)]
    pub sku_ids: Option<String>,
    /// Explicit quantity for a single-SKU direct buy
    #[serde(default)]
    pub count: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a comma-separated SKU id list.
///
/// # Errors
///
/// Returns [`CommitError::MissingFields`] if the list is empty or any id is
/// not an integer.
pub fn parse_sku_ids(raw: Option<&str>) -> Result<Vec<SkuId>, CommitError> {
    let raw = non_empty(raw).ok_or(CommitError::MissingFields("sku_ids"))?;
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<SkuId>().map_err(|_| CommitError::MissingFields("sku_ids")))
        .collect::<Result<Vec<_>, _>>()
        .and_then(|ids| {
            if ids.is_empty() {
                Err(CommitError::MissingFields("sku_ids"))
            } else {
                Ok(ids)
            }
        })
}

impl CommitForm {
    /// Validate field presence and formats.
    ///
    /// `count` is honoured only when exactly one SKU is submitted.
    ///
    /// # Errors
    ///
    /// - [`CommitError::MissingFields`] for absent, empty or unparsable ids
    /// - [`CommitError::InvalidPayMethod`] for an unknown pay method
    pub fn into_request(self, user_id: UserId) -> Result<CommitRequest, CommitError> {
        let address_id = non_empty(self.addr_id.as_deref())
            .and_then(|raw| raw.parse::<AddressId>().ok())
            .ok_or(CommitError::MissingFields("addr_id"))?;
        let pay_method: PayMethod = non_empty(self.pay_method.as_deref())
            .ok_or(CommitError::MissingFields("pay_method"))?
            .parse()?;
        let sku_ids = parse_sku_ids(self.sku_ids.as_deref())?;

        let explicit = if sku_ids.len() == 1 { self.count } else { None };
        let items = sku_ids
            .into_iter()
            .map(|sku_id| CommitItem {
                sku_id,
                quantity: explicit.clone(),
            })
            .collect();

        Ok(CommitRequest {
            user_id,
            address_id,
            pay_method,
            items,
        })
    }
}

/// A SKU and the quantity to reserve for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reservation {
    sku_id: SkuId,
    quantity: u32,
    from_cart: bool,
}

/// Commits orders against an [`OrderStore`].
pub struct CommitEngine<S> {
    store: Arc<S>,
    env: Environment,
    settings: CommitSettings,
}

impl<S> Clone for CommitEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            env: self.env.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: OrderStore> CommitEngine<S> {
    /// Engine over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, env: Environment, settings: CommitSettings) -> Self {
        Self { store, env, settings }
    }

    /// Commit `request` and return the new order id.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitError`] naming the reason (and the SKU, where one is
    /// at fault). Nothing is persisted when an error is returned.
    pub async fn commit(&self, request: CommitRequest) -> Result<OrderId, CommitError> {
        let started = Instant::now();
        let span = tracing::info_span!(
            "commit",
            user_id = %request.user_id,
            items = request.items.len(),
            order_id = tracing::field::Empty,
        );

        let result = self.try_commit(request).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "committed",
            Err(err) => err.reason().as_str(),
        };
        CommitMetrics::record_outcome(outcome, started.elapsed());
        result
    }

    async fn try_commit(&self, request: CommitRequest) -> Result<OrderId, CommitError> {
        if request.items.is_empty() {
            return Err(CommitError::MissingFields("sku_ids"));
        }

        if self
            .env
            .addresses
            .get(request.address_id, request.user_id)
            .await?
            .is_none()
        {
            return Err(CommitError::InvalidAddress(request.address_id));
        }

        let reservations = self.resolve_quantities(&request).await?;

        let now = self.env.clock.now();
        let order_id = self.env.ids.next_id(request.user_id, now);
        tracing::Span::current().record("order_id", order_id.as_str());

        let header = OrderHeader {
            order_id: order_id.clone(),
            user_id: request.user_id,
            address_id: request.address_id,
            pay_method: request.pay_method,
            total_count: 0,
            total_price: Money::ZERO,
            transit_price: self.settings.transit_price,
            status: OrderStatus::Created,
            trade_no: None,
            created_at: now,
        };

        let mut tx = self.store.begin().await?;
        match self.reserve(&mut tx, &header, &reservations).await {
            Ok((total_count, total_price)) => {
                tx.commit().await?;
                tracing::info!(total_count, total_price = %total_price, "Order committed");
            }
            Err(err) => {
                tracing::info!(error = %err, reason = %err.reason(), "Commit rejected, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(err);
            }
        }

        self.clear_cart(request.user_id, &reservations).await;
        Ok(order_id)
    }

    /// Resolve one quantity per distinct SKU: explicit wins, else the cart.
    ///
    /// Quantities are validated in request order; the result is sorted by
    /// SKU id.
    async fn resolve_quantities(&self, request: &CommitRequest) -> Result<Vec<Reservation>, CommitError> {
        let needs_cart = request.items.iter().any(|item| item.quantity.is_none());
        let cart: BTreeMap<SkuId, String> = if needs_cart {
            self.env.carts.get_all(request.user_id).await?
        } else {
            BTreeMap::new()
        };

        let mut seen = HashSet::new();
        let mut reservations = Vec::with_capacity(request.items.len());

        for item in &request.items {
            if !seen.insert(item.sku_id) {
                continue;
            }

            let (raw, from_cart) = match &item.quantity {
                Some(raw) => (raw.as_str(), false),
                None => (cart.get(&item.sku_id).map_or("", String::as_str), true),
            };
            let quantity = parse_quantity(raw).map_err(|_| CommitError::InvalidQuantity {
                sku_id: item.sku_id,
                raw: raw.to_string(),
            })?;

            reservations.push(Reservation {
                sku_id: item.sku_id,
                quantity,
                from_cart,
            });
        }

        // Row locks are taken in ascending SKU order so that two commits over
        // the same SKUs can never wait on each other in a cycle.
        reservations.sort_by_key(|r| r.sku_id);
        Ok(reservations)
    }

    async fn reserve(
        &self,
        tx: &mut S::Transaction,
        header: &OrderHeader,
        reservations: &[Reservation],
    ) -> Result<(u32, Money), CommitError> {
        tx.insert_header(header).await?;

        let mut total_count: u32 = 0;
        let mut total_price = Money::ZERO;

        for reservation in reservations {
            let price = self.take_stock(tx, reservation.sku_id, reservation.quantity).await?;
            let overflow = || CommitError::TotalOverflow(reservation.sku_id);
            let subtotal = price.checked_times(reservation.quantity).ok_or_else(overflow)?;
            total_price = total_price.checked_add(subtotal).ok_or_else(overflow)?;
            total_count = total_count.checked_add(reservation.quantity).ok_or_else(overflow)?;

            tx.insert_line(&OrderLine {
                order_id: header.order_id.clone(),
                sku_id: reservation.sku_id,
                count: reservation.quantity,
                price,
                comment: None,
            })
            .await?;
        }

        tx.finalize_totals(&header.order_id, total_count, total_price)
            .await?;
        tx.record_task(&Task::OrderPlaced {
            order_id: header.order_id.clone(),
            user_id: header.user_id,
        })
        .await?;
        Ok((total_count, total_price))
    }

    /// Compare-and-swap stock decrement. Returns the unit price read in the
    /// cycle that won.
    async fn take_stock(
        &self,
        tx: &mut S::Transaction,
        sku_id: SkuId,
        quantity: u32,
    ) -> Result<Money, CommitError> {
        let result: Result<Money, OptimisticError<CommitError>> =
            retry_optimistic(&self.settings.retry, tx, move |tx, attempt| {
                Box::pin(async move {
                    let sku = tx
                        .load_sku(sku_id)
                        .await?
                        .ok_or(CommitError::SkuNotFound(sku_id))?;

                    if !sku.can_supply(quantity) {
                        return Err(CommitError::InsufficientStock {
                            sku_id,
                            requested: quantity,
                            available: sku.stock,
                        });
                    }

                    if tx.decrement_stock(sku_id, sku.stock, quantity).await? {
                        Ok(Attempt::Done(sku.price))
                    } else {
                        CommitMetrics::record_conflict();
                        tracing::debug!(
                            sku_id = %sku_id,
                            attempt,
                            expected_stock = sku.stock,
                            "Stock changed since read"
                        );
                        Ok(Attempt::Conflict)
                    }
                })
            })
            .await;

        match result {
            Ok(price) => Ok(price),
            Err(OptimisticError::Rejected(err)) => Err(err),
            Err(OptimisticError::Exhausted { attempts }) => {
                tracing::warn!(sku_id = %sku_id, attempts, "Gave up on contended sku");
                Err(CommitError::ContentionExhausted {
                    sku_id,
                    attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
                })
            }
        }
    }

    async fn clear_cart(&self, user_id: UserId, reservations: &[Reservation]) {
        let consumed: Vec<SkuId> = reservations
            .iter()
            .filter(|r| r.from_cart)
            .map(|r| r.sku_id)
            .collect();
        if consumed.is_empty() {
            return;
        }

        if let Err(err) = self.env.carts.remove_many(user_id, consumed).await {
            CommitMetrics::record_cleanup_failure();
            tracing::warn!(error = %err, "Order committed but cart cleanup failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn form_requires_every_field() {
        let user = UserId::new(1);
        let complete = CommitForm {
            addr_id: Some("3".into()),
            pay_method: Some("3".into()),
            sku_ids: Some("1, 2".into()),
            count: None,
        };

        let request = complete.clone().into_request(user).unwrap();
        assert_eq!(request.address_id, AddressId::new(3));
        assert_eq!(request.pay_method, PayMethod::Gateway);
        assert_eq!(
            request.items,
            vec![CommitItem::from_cart(SkuId::new(1)), CommitItem::from_cart(SkuId::new(2))]
        );

        let no_addr = CommitForm {
            addr_id: Some(" ".into()),
            ..complete.clone()
        };
        assert_eq!(
            no_addr.into_request(user),
            Err(CommitError::MissingFields("addr_id"))
        );

        let no_skus = CommitForm {
            sku_ids: Some(",".into()),
            ..complete.clone()
        };
        assert_eq!(
            no_skus.into_request(user),
            Err(CommitError::MissingFields("sku_ids"))
        );

        let bad_method = CommitForm {
            pay_method: Some("9".into()),
            ..complete
        };
        assert_eq!(
            bad_method.into_request(user).unwrap_err().reason(),
            storefront_core::RejectReason::InvalidPayMethod
        );
    }

    #[test]
    fn count_applies_only_to_single_sku_direct_buy() {
        let user = UserId::new(1);
        let direct = CommitForm {
            addr_id: Some("1".into()),
            pay_method: Some("1".into()),
            sku_ids: Some("7".into()),
            count: Some("2".into()),
        };
        assert_eq!(
            direct.clone().into_request(user).unwrap().items,
            vec![CommitItem::direct(SkuId::new(7), "2")]
        );

        let several = CommitForm {
            sku_ids: Some("7,8".into()),
            ..direct
        };
        assert!(
            several
                .into_request(user)
                .unwrap()
                .items
                .iter()
                .all(|item| item.quantity.is_none())
        );
    }
}
