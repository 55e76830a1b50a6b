//! Gateway payment: initiation and confirmation by polling.
//!
//! ```text
//! check ──► query ──► Success ──► Created → Paid + outbox row (idempotent)
//!             │
//!             ├──► Pending ──► sleep(poll_interval) ──► query ...
//!             │                  (until max_wait elapses)
//!             └──► Failed  ──► Declined
//! ```
//!
//! Dropping the future returned by [`PaymentService::check`] cancels the
//! poll loop; no state is changed until a success is observed.

use crate::environment::Environment;
use crate::metrics::PaymentMetrics;
use std::sync::Arc;
use std::time::Duration;
use storefront_core::payment::PaymentStatus;
use storefront_core::store::{OrderStore, OrderTransaction};
use storefront_core::task::Task;
use storefront_core::{OrderHeader, OrderId, OrderStatus, PaymentError, StoreError, UserId};
use tokio::time::Instant;

/// Polling tuning.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Pause between two queries while the payment is pending
    pub poll_interval: Duration,
    /// Give up after this long without a definitive answer
    pub max_wait: Duration,
    /// Prefix of the trade description sent to the gateway
    pub subject: String,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(60),
            subject: "Storefront order".to_string(),
        }
    }
}

/// Result of a confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PaymentConfirmation {
    /// Order
    pub order_id: OrderId,
    /// Gateway trade number
    pub trade_no: String,
    /// `false` when the order had already been confirmed
    pub newly_paid: bool,
}

/// Gateway payment flow for [`storefront_core::PayMethod::Gateway`] orders.
pub struct PaymentService<S> {
    store: Arc<S>,
    env: Environment,
    settings: PaymentSettings,
}

impl<S> Clone for PaymentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            env: self.env.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: OrderStore> PaymentService<S> {
    /// Service over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, env: Environment, settings: PaymentSettings) -> Self {
        Self { store, env, settings }
    }

    async fn gateway_order(&self, user_id: UserId, order_id: &OrderId) -> Result<OrderHeader, PaymentError> {
        self.store
            .find_order(order_id)
            .await?
            .filter(|h| h.user_id == user_id && h.pay_method.requires_gateway())
            .ok_or_else(|| PaymentError::NotPayable(order_id.clone()))
    }

    /// Create the gateway trade and return the URL to send the buyer to.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotPayable`] unless the order is the user's,
    /// uses the gateway and is still [`OrderStatus::Created`].
    pub async fn initiate(&self, user_id: UserId, order_id: &OrderId) -> Result<String, PaymentError> {
        let header = self.gateway_order(user_id, order_id).await?;
        if header.status != OrderStatus::Created {
            return Err(PaymentError::NotPayable(order_id.clone()));
        }

        let amount = header.total_pay();
        let description = format!("{} {order_id}", self.settings.subject);
        let url = self
            .env
            .gateway
            .initiate_payment(order_id, amount, &description)
            .await?;

        tracing::info!(order_id = %order_id, amount = %amount, "Gateway payment initiated");
        Ok(url)
    }

    /// Poll the gateway until the payment settles, fails or `max_wait`
    /// elapses.
    ///
    /// Orders already paid (or further along) return immediately.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::Declined`] on a definitive gateway failure
    /// - [`PaymentError::TimedOut`] if still pending after `max_wait`
    /// - [`PaymentError::Gateway`] on a non-transient gateway error
    pub async fn check(&self, user_id: UserId, order_id: &OrderId) -> Result<PaymentConfirmation, PaymentError> {
        let header = self.gateway_order(user_id, order_id).await?;
        if header.status != OrderStatus::Created {
            return Ok(PaymentConfirmation {
                order_id: order_id.clone(),
                trade_no: header.trade_no.unwrap_or_default(),
                newly_paid: false,
            });
        }

        let deadline = Instant::now() + self.settings.max_wait;
        loop {
            match self.env.gateway.query_payment(order_id).await {
                Ok(answer) => match answer.status() {
                    PaymentStatus::Success { trade_no } => {
                        PaymentMetrics::record_poll("success");
                        return self.confirm(order_id, &trade_no).await;
                    }
                    PaymentStatus::Failed { detail } => {
                        PaymentMetrics::record_poll("failed");
                        tracing::warn!(order_id = %order_id, detail = %detail, "Gateway reported payment failure");
                        return Err(PaymentError::Declined {
                            order_id: order_id.clone(),
                            detail,
                        });
                    }
                    PaymentStatus::Pending => {
                        PaymentMetrics::record_poll("pending");
                    }
                },
                Err(err) if err.is_transient() => {
                    PaymentMetrics::record_poll("error");
                    tracing::warn!(order_id = %order_id, error = %err, "Gateway query failed, will retry");
                }
                Err(err) => {
                    PaymentMetrics::record_poll("error");
                    return Err(err.into());
                }
            }

            if Instant::now() + self.settings.poll_interval > deadline {
                tracing::info!(order_id = %order_id, "Payment still pending, giving up");
                return Err(PaymentError::TimedOut(order_id.clone()));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Record a gateway success: `Created → Paid` with the trade number.
    ///
    /// Repeated notifications for an order already paid (or further along)
    /// change nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotPayable`] if the order does not exist or
    /// is not a gateway order.
    pub async fn confirm(&self, order_id: &OrderId, trade_no: &str) -> Result<PaymentConfirmation, PaymentError> {
        let header = self
            .store
            .find_order(order_id)
            .await?
            .filter(|h| h.pay_method.requires_gateway())
            .ok_or_else(|| PaymentError::NotPayable(order_id.clone()))?;

        if header.status == OrderStatus::Created && self.mark_paid(order_id, trade_no).await? {
            tracing::info!(order_id = %order_id, trade_no = %trade_no, "Payment confirmed");
            return Ok(PaymentConfirmation {
                order_id: order_id.clone(),
                trade_no: trade_no.to_string(),
                newly_paid: true,
            });
        }

        // Lost the race or already confirmed: report what is stored.
        match self.store.find_order(order_id).await? {
            Some(current) if current.status >= OrderStatus::Paid => {
                tracing::debug!(order_id = %order_id, "Duplicate payment confirmation ignored");
                Ok(PaymentConfirmation {
                    order_id: order_id.clone(),
                    trade_no: current.trade_no.unwrap_or_else(|| trade_no.to_string()),
                    newly_paid: false,
                })
            }
            _ => Err(PaymentError::NotPayable(order_id.clone())),
        }
    }

    /// `Created → Paid` plus the `PaymentConfirmed` outbox row, atomically.
    /// `false` when the order had already left `Created`.
    async fn mark_paid(&self, order_id: &OrderId, trade_no: &str) -> Result<bool, StoreError> {
        let mut tx = self.store.begin().await?;
        if !tx
            .advance_status(order_id, OrderStatus::Created, OrderStatus::Paid, Some(trade_no))
            .await?
        {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.record_task(&Task::PaymentConfirmed {
            order_id: order_id.clone(),
            trade_no: trade_no.to_string(),
        })
        .await?;
        tx.commit().await?;
        Ok(true)
    }
}
