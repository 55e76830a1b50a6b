//! `PostgreSQL` order store.
//!
//! # Schema
//!
//! See `migrations/0001_init.sql`. `skus.stock` carries a
//! `CHECK (stock >= 0)` constraint so the ledger can never go negative even
//! if a caller skips the read-decide step.
//!
//! # Compare-and-swap
//!
//! ```sql
//! UPDATE skus SET stock = stock - $3, sales = sales + $3
//! WHERE id = $1 AND stock = $2
//! ```
//!
//! Zero rows affected means another transaction changed the stock after it
//! was read; the caller re-reads and decides again. The `UPDATE` holds the
//! row lock until commit, and the engine takes SKUs in ascending id order so
//! two commits never wait on each other's rows in a cycle.
//!
//! # Outbox
//!
//! See `migrations/0002_task_outbox.sql`. Rows are inserted by
//! [`OrderTransaction::record_task`] in the caller's transaction. A claim
//! bumps `attempts` and pushes `available_at` to the lease end, selecting
//! with `FOR UPDATE SKIP LOCKED` so concurrent relays never block on or
//! double-claim the same row. Rows move to `completed`, never get deleted.

use crate::convert::{
    db_error, header_from_row, line_from_row, money_to_db, pending_task_from_row, sku_from_row, task_to_db,
};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use storefront_core::error::StoreError;
use storefront_core::store::{OrderStore, OrderTransaction};
use storefront_core::task::{PendingTask, Task};
use storefront_core::{Money, OrderHeader, OrderId, OrderLine, OrderStatus, Sku, SkuId, UserId};

const SKU_COLUMNS: &str = "id, goods_id, type_id, name, unit, price_cents, stock, sales";

const HEADER_COLUMNS: &str = "order_id, user_id, address_id, pay_method, total_count, total_price_cents, \
     transit_price_cents, order_status, trade_no, created_at";

/// Order store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        crate::migrate(&self.pool).await
    }

    /// Insert a SKU with its given id (catalog seeding).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the id is taken.
    pub async fn insert_sku(&self, sku: &Sku) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO skus (id, goods_id, type_id, name, unit, price_cents, stock, sales)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(sku.id.get())
        .bind(sku.goods_id.get())
        .bind(sku.type_id.get())
        .bind(&sku.name)
        .bind(&sku.unit)
        .bind(money_to_db(sku.price)?)
        .bind(i64::from(sku.stock))
        .bind(i64::from(sku.sales))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert sku", e))?;

        Ok(())
    }

    /// Change a SKU's price. Existing order lines keep their snapshot.
    ///
    /// Returns `false` if the SKU does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    pub async fn update_sku_price(&self, sku_id: SkuId, price: Money) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE skus SET price_cents = $2 WHERE id = $1")
            .bind(sku_id.get())
            .bind(money_to_db(price)?)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("update sku price", e))?;

        Ok(result.rows_affected() == 1)
    }
}

impl OrderStore for PostgresOrderStore {
    type Transaction = PgOrderTransaction;

    async fn begin(&self) -> Result<PgOrderTransaction, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error("begin", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("set isolation", e))?;

        Ok(PgOrderTransaction { tx })
    }

    async fn find_sku(&self, sku_id: SkuId) -> Result<Option<Sku>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SKU_COLUMNS} FROM skus WHERE id = $1"))
            .bind(sku_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find sku", e))?;

        row.as_ref().map(sku_from_row).transpose()
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Option<OrderHeader>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM order_headers WHERE order_id = $1"
        ))
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find order", e))?;

        row.as_ref().map(header_from_row).transpose()
    }

    async fn order_lines(&self, order_id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT order_id, sku_id, count, price_cents, comment
            FROM order_lines
            WHERE order_id = $1
            ORDER BY sku_id ASC
            ",
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("order lines", e))?;

        rows.iter().map(line_from_row).collect()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderHeader>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM order_headers WHERE user_id = $1 \
             ORDER BY created_at DESC, order_id DESC"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("orders for user", e))?;

        rows.iter().map(header_from_row).collect()
    }

    async fn advance_status(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE order_headers
            SET order_status = $3, trade_no = COALESCE($4, trade_no)
            WHERE order_id = $1 AND order_status = $2
            ",
        )
        .bind(order_id.as_str())
        .bind(from.code())
        .bind(to.code())
        .bind(trade_no)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("advance status", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingTask>, StoreError> {
        let rows = sqlx::query(
            r"
            UPDATE task_outbox
            SET attempts = attempts + 1, available_at = $2
            WHERE id IN (
                SELECT id FROM task_outbox
                WHERE status = 'pending' AND available_at <= $1
                ORDER BY id
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, attempts
            ",
        )
        .bind(now)
        .bind(lease_until)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("claim tasks", e))?;

        let mut claimed = rows.iter().map(pending_task_from_row).collect::<Result<Vec<_>, _>>()?;
        claimed.sort_by_key(|pending| pending.id);
        Ok(claimed)
    }

    async fn complete_task(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE task_outbox
            SET status = 'completed', completed_at = now(), last_error = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("complete task", e))?;

        Ok(())
    }

    async fn retry_task(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE task_outbox
            SET last_error = $2, available_at = $3
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("retry task", e))?;

        Ok(())
    }
}

/// A READ COMMITTED transaction. Dropping it without
/// [`OrderTransaction::commit`] rolls it back.
pub struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
}

impl OrderTransaction for PgOrderTransaction {
    async fn insert_header(&mut self, header: &OrderHeader) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO order_headers (
                order_id, user_id, address_id, pay_method, total_count, total_price_cents,
                transit_price_cents, order_status, trade_no, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(header.order_id.as_str())
        .bind(header.user_id.get())
        .bind(header.address_id.get())
        .bind(header.pay_method.code())
        .bind(i64::from(header.total_count))
        .bind(money_to_db(header.total_price)?)
        .bind(money_to_db(header.transit_price)?)
        .bind(header.status.code())
        .bind(header.trade_no.as_deref())
        .bind(header.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("insert order header", e))?;

        Ok(())
    }

    async fn load_sku(&mut self, sku_id: SkuId) -> Result<Option<Sku>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SKU_COLUMNS} FROM skus WHERE id = $1"))
            .bind(sku_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("load sku", e))?;

        row.as_ref().map(sku_from_row).transpose()
    }

    async fn decrement_stock(
        &mut self,
        sku_id: SkuId,
        expected_stock: u32,
        quantity: u32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE skus
            SET stock = stock - $3, sales = sales + $3
            WHERE id = $1 AND stock = $2
            ",
        )
        .bind(sku_id.get())
        .bind(i64::from(expected_stock))
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("decrement stock", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_line(&mut self, line: &OrderLine) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO order_lines (order_id, sku_id, count, price_cents, comment)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(line.order_id.as_str())
        .bind(line.sku_id.get())
        .bind(i64::from(line.count))
        .bind(money_to_db(line.price)?)
        .bind(line.comment.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("insert order line", e))?;

        Ok(())
    }

    async fn finalize_totals(
        &mut self,
        order_id: &OrderId,
        total_count: u32,
        total_price: Money,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE order_headers
            SET total_count = $2, total_price_cents = $3
            WHERE order_id = $1
            ",
        )
        .bind(order_id.as_str())
        .bind(i64::from(total_count))
        .bind(money_to_db(total_price)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("finalize totals", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Database(format!("no header for order {order_id}")));
        }
        Ok(())
    }

    async fn set_comment(&mut self, order_id: &OrderId, sku_id: SkuId, comment: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE order_lines SET comment = $3 WHERE order_id = $1 AND sku_id = $2")
            .bind(order_id.as_str())
            .bind(sku_id.get())
            .bind(comment)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("set comment", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn advance_status(
        &mut self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE order_headers
            SET order_status = $3, trade_no = COALESCE($4, trade_no)
            WHERE order_id = $1 AND order_status = $2
            ",
        )
        .bind(order_id.as_str())
        .bind(from.code())
        .bind(to.code())
        .bind(trade_no)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("advance status", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_task(&mut self, task: &Task) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO task_outbox (kind, payload) VALUES ($1, $2)")
            .bind(task.kind())
            .bind(task_to_db(task)?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("record task", e))?;

        metrics::counter!("store_outbox_recorded_total", "kind" => task.kind()).increment(1);
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| db_error("commit", e))?;
        metrics::counter!("store_transactions_total", "outcome" => "committed").increment(1);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| db_error("rollback", e))?;
        metrics::counter!("store_transactions_total", "outcome" => "rolled_back").increment(1);
        Ok(())
    }
}
