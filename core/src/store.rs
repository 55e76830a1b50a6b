//! Durable order store and its transaction boundary.
//!
//! # Design
//!
//! The inventory ledger and the order aggregate live in the same relational
//! store so that an order and the stock it consumed commit together. The
//! commit engine drives an [`OrderTransaction`]:
//!
//! - header inserted with zero totals
//! - per SKU, in ascending id order: read, then conditional decrement
//!   (compare-and-swap on `stock`)
//! - line inserted with the price read in the same cycle
//! - totals finalized and an `OrderPlaced` outbox row recorded, then commit
//!
//! Dropping a transaction without committing rolls it back.
//!
//! # Outbox
//!
//! Follow-up work is recorded with [`OrderTransaction::record_task`] and
//! becomes visible only if the transaction commits. A relay claims rows with
//! [`OrderStore::claim_tasks`]; a claim is a lease, so a row whose relay died
//! mid-delivery is claimed again once the lease runs out. Rows are only ever
//! completed or rescheduled, never discarded.
//!
//! # Implementations
//!
//! - `PostgresOrderStore` (in `storefront-postgres`): production
//! - `InMemoryOrderStore` (in `storefront-testing`): fast, deterministic tests

use crate::error::StoreError;
use crate::order::{OrderHeader, OrderLine, OrderStatus};
use crate::sku::Sku;
use crate::task::{PendingTask, Task};
use crate::types::{Money, OrderId, SkuId, UserId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Durable store for the inventory ledger and the order aggregate.
pub trait OrderStore: Send + Sync {
    /// Transaction handle returned by [`OrderStore::begin`].
    type Transaction: OrderTransaction;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if no connection is available.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, StoreError>> + Send;

    /// Read a SKU outside any transaction (previews, cart checks).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn find_sku(&self, sku_id: SkuId) -> impl Future<Output = Result<Option<Sku>, StoreError>> + Send;

    /// Read a committed order header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn find_order(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<Option<OrderHeader>, StoreError>> + Send;

    /// Read the committed lines of an order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn order_lines(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<Vec<OrderLine>, StoreError>> + Send;

    /// Committed orders of one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn orders_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<OrderHeader>, StoreError>> + Send;

    /// Move an order from `from` to `to` only if it is still in `from`.
    ///
    /// `trade_no` is recorded when given. Returns `false` when the status
    /// had already changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn advance_status(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Lease up to `limit` outbox rows that are due at `now`, oldest first.
    ///
    /// Each claimed row counts one more attempt and stays invisible to other
    /// claims until `lease_until`. Rows leased by a concurrent relay are
    /// skipped, not waited for.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the claim fails.
    fn claim_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PendingTask>, StoreError>> + Send;

    /// Mark an outbox row as delivered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn complete_task(&self, id: i64) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Record a failed delivery and make the row due again at `retry_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn retry_task(
        &self,
        id: i64,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// One atomic unit of work against an [`OrderStore`].
pub trait OrderTransaction: Send {
    /// Insert a new order header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the order id already exists.
    fn insert_header(
        &mut self,
        header: &OrderHeader,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read the latest committed state of a SKU, plus this transaction's
    /// own decrements.
    ///
    /// Each call must observe the most recently committed `stock`, so a
    /// retry after a lost race sees the winner's decrement.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn load_sku(&mut self, sku_id: SkuId) -> impl Future<Output = Result<Option<Sku>, StoreError>> + Send;

    /// Conditionally take `quantity` units: decrement `stock` and increment
    /// `sales` only if `stock` still equals `expected_stock`.
    ///
    /// A successful decrement locks the SKU row until this transaction ends;
    /// a decrement of a row locked by another transaction waits for it.
    ///
    /// Returns `false` when zero rows matched (a concurrent commit won).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn decrement_stock(
        &mut self,
        sku_id: SkuId,
        expected_stock: u32,
        quantity: u32,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Insert an order line.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    fn insert_line(&mut self, line: &OrderLine) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write the final totals onto the header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn finalize_totals(
        &mut self,
        order_id: &OrderId,
        total_count: u32,
        total_price: Money,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Store a comment on the line for `sku_id`. Returns `false` when the
    /// order has no such line.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn set_comment(
        &mut self,
        order_id: &OrderId,
        sku_id: SkuId,
        comment: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Conditional status change inside this transaction; `trade_no` is
    /// recorded when given.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    fn advance_status(
        &mut self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Add a task to the outbox. It becomes claimable once this
    /// transaction commits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    fn record_task(&mut self, task: &Task) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Make every change durable and visible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the commit fails; nothing is persisted then.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard every change.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the rollback statement fails.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
