//! In-memory order store.
//!
//! Models the visibility and locking rules of a READ COMMITTED relational
//! store closely enough for commit-engine tests:
//!
//! - every write stays private to its transaction until commit; reads inside
//!   a transaction see committed state plus the transaction's own writes
//! - a successful conditional write locks its row (SKU, order header or
//!   order line) until the transaction ends; another transaction writing the
//!   same row waits, then re-checks its condition against what was committed
//! - outbox rows recorded in a transaction become claimable on commit
//!
//! Lock waits are not checked for cycles: two transactions locking the same
//! rows in opposite orders hang here where a relational store would abort
//! one of them.
//!
//! Hooks make contention deterministic: [`InMemoryOrderStore::inject_conflicts`]
//! forces conditional decrements to miss, and
//! [`InMemoryOrderStore::gate_first_reads`] holds the first SKU read of the
//! next `n` transactions until all of them have read.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use storefront_core::error::StoreError;
use storefront_core::store::{OrderStore, OrderTransaction};
use storefront_core::task::{PendingTask, Task};
use storefront_core::{Money, OrderHeader, OrderId, OrderLine, OrderStatus, Sku, SkuId, UserId};
use tokio::sync::{Barrier, Notify};

/// Lock owner used by writes made outside any transaction.
const AUTOCOMMIT: u64 = 0;

struct ReadGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Row {
    Sku(SkuId),
    Order(OrderId),
    Line(OrderId, SkuId),
}

struct OutboxRow {
    task: Task,
    attempts: u32,
    due_at: DateTime<Utc>,
    last_error: Option<String>,
    completed: bool,
}

#[derive(Default)]
struct Ledger {
    skus: HashMap<SkuId, Sku>,
    orders: HashMap<OrderId, OrderHeader>,
    lines: HashMap<OrderId, Vec<OrderLine>>,
    /// Commit sequence of each order, newest highest
    placed: HashMap<OrderId, u64>,
    outbox: BTreeMap<i64, OutboxRow>,
    row_locks: HashMap<Row, u64>,
    next_tx: u64,
    next_sequence: u64,
    next_task: i64,
    forced_conflicts: HashMap<SkuId, u32>,
    read_gate: Option<ReadGate>,
    fail_next_commit: bool,
    commits: usize,
    rollbacks: usize,
}

impl Ledger {
    fn held_by_other(&self, row: &Row, tx: u64) -> bool {
        self.row_locks.get(row).is_some_and(|&owner| owner != tx)
    }

    fn release(&mut self, tx: u64) {
        self.row_locks.retain(|_, owner| *owner != tx);
    }
}

fn lock(ledger: &Mutex<Ledger>) -> Result<MutexGuard<'_, Ledger>, StoreError> {
    ledger
        .lock()
        .map_err(|_| StoreError::Unavailable("ledger mutex poisoned".to_string()))
}

/// Wait until `row` is free or owned by `tx`, and return the ledger guard
/// taken while it was.
async fn acquire<'a>(
    ledger: &'a Mutex<Ledger>,
    released: &Notify,
    tx: u64,
    row: &Row,
) -> Result<MutexGuard<'a, Ledger>, StoreError> {
    loop {
        let notified = released.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        {
            let guard = lock(ledger)?;
            if !guard.held_by_other(row, tx) {
                return Ok(guard);
            }
        }
        notified.await;
    }
}

/// Order store backed by hash maps.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    ledger: Arc<Mutex<Ledger>>,
    released: Arc<Notify>,
}

impl InMemoryOrderStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `skus`.
    #[must_use]
    pub fn with_skus(skus: impl IntoIterator<Item = Sku>) -> Self {
        let store = Self::new();
        if let Ok(mut ledger) = store.ledger.lock() {
            ledger.skus.extend(skus.into_iter().map(|sku| (sku.id, sku)));
        }
        store
    }

    /// Insert or replace a SKU.
    ///
    /// # Errors
    ///
    /// Returns error if the ledger lock is poisoned.
    pub fn insert_sku(&self, sku: Sku) -> Result<(), StoreError> {
        lock(&self.ledger)?.skus.insert(sku.id, sku);
        Ok(())
    }

    /// Committed state of a SKU.
    #[must_use]
    pub fn sku(&self, sku_id: SkuId) -> Option<Sku> {
        lock(&self.ledger).ok()?.skus.get(&sku_id).cloned()
    }

    /// Change a SKU's price.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned or the SKU does not exist.
    pub fn set_price(&self, sku_id: SkuId, price: Money) -> Result<(), StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let sku = ledger
            .skus
            .get_mut(&sku_id)
            .ok_or_else(|| StoreError::Database(format!("no sku {sku_id}")))?;
        sku.price = price;
        Ok(())
    }

    /// Make the next `misses` conditional decrements of `sku_id` match zero
    /// rows, as if a concurrent commit had won each time.
    ///
    /// # Errors
    ///
    /// Returns error if the ledger lock is poisoned.
    pub fn inject_conflicts(&self, sku_id: SkuId, misses: u32) -> Result<(), StoreError> {
        lock(&self.ledger)?.forced_conflicts.insert(sku_id, misses);
        Ok(())
    }

    /// Hold the first SKU read of each of the next `parties` transactions
    /// until all of them have performed it.
    ///
    /// # Errors
    ///
    /// Returns error if the ledger lock is poisoned.
    pub fn gate_first_reads(&self, parties: usize) -> Result<(), StoreError> {
        lock(&self.ledger)?.read_gate = Some(ReadGate {
            barrier: Arc::new(Barrier::new(parties)),
            remaining: parties,
        });
        Ok(())
    }

    /// Make the next commit fail with a database error.
    ///
    /// # Errors
    ///
    /// Returns error if the ledger lock is poisoned.
    pub fn fail_next_commit(&self) -> Result<(), StoreError> {
        lock(&self.ledger)?.fail_next_commit = true;
        Ok(())
    }

    /// Force an order into `status` (test setup).
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned or the order does not exist.
    pub fn force_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<(), StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let header = ledger
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::Database(format!("no order {order_id}")))?;
        header.status = status;
        Ok(())
    }

    /// Number of committed orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        lock(&self.ledger).map(|l| l.orders.len()).unwrap_or_default()
    }

    /// Number of committed order lines across all orders.
    #[must_use]
    pub fn line_count(&self) -> usize {
        lock(&self.ledger)
            .map(|l| l.lines.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    /// Every committed order id.
    #[must_use]
    pub fn order_ids(&self) -> Vec<OrderId> {
        lock(&self.ledger)
            .map(|l| l.orders.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Transactions committed and rolled back so far.
    #[must_use]
    pub fn transaction_counts(&self) -> (usize, usize) {
        lock(&self.ledger)
            .map(|l| (l.commits, l.rollbacks))
            .unwrap_or_default()
    }

    /// Outbox rows not yet delivered, oldest first, whether due or not.
    #[must_use]
    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        lock(&self.ledger)
            .map(|l| {
                l.outbox
                    .iter()
                    .filter(|(_, row)| !row.completed)
                    .map(|(&id, row)| PendingTask {
                        id,
                        task: row.task.clone(),
                        attempts: row.attempts,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Last delivery error recorded for an outbox row.
    #[must_use]
    pub fn task_error(&self, id: i64) -> Option<String> {
        lock(&self.ledger).ok()?.outbox.get(&id)?.last_error.clone()
    }

    /// Number of delivered outbox rows.
    #[must_use]
    pub fn completed_task_count(&self) -> usize {
        lock(&self.ledger)
            .map(|l| l.outbox.values().filter(|row| row.completed).count())
            .unwrap_or_default()
    }
}

impl OrderStore for InMemoryOrderStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, StoreError> {
        let (id, gate) = {
            let mut ledger = lock(&self.ledger)?;
            ledger.next_tx += 1;
            let barrier = ledger.read_gate.as_mut().map(|gate| {
                gate.remaining = gate.remaining.saturating_sub(1);
                Arc::clone(&gate.barrier)
            });
            if ledger.read_gate.as_ref().is_some_and(|g| g.remaining == 0) {
                ledger.read_gate = None;
            }
            (ledger.next_tx, barrier)
        };

        Ok(InMemoryTransaction {
            id,
            ledger: Arc::clone(&self.ledger),
            released: Arc::clone(&self.released),
            gate,
            headers: Vec::new(),
            lines: Vec::new(),
            taken: HashMap::new(),
            statuses: HashMap::new(),
            comments: HashMap::new(),
            tasks: Vec::new(),
            finished: false,
        })
    }

    async fn find_sku(&self, sku_id: SkuId) -> Result<Option<Sku>, StoreError> {
        Ok(lock(&self.ledger)?.skus.get(&sku_id).cloned())
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Option<OrderHeader>, StoreError> {
        Ok(lock(&self.ledger)?.orders.get(order_id).cloned())
    }

    async fn order_lines(&self, order_id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let mut lines = lock(&self.ledger)?
            .lines
            .get(order_id)
            .cloned()
            .unwrap_or_default();
        lines.sort_by_key(|line| line.sku_id);
        Ok(lines)
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderHeader>, StoreError> {
        let ledger = lock(&self.ledger)?;
        let mut orders: Vec<(u64, OrderHeader)> = ledger
            .orders
            .values()
            .filter(|header| header.user_id == user_id)
            .map(|header| {
                let sequence = ledger.placed.get(&header.order_id).copied().unwrap_or_default();
                (sequence, header.clone())
            })
            .collect();
        orders.sort_by(|(a_seq, a), (b_seq, b)| b.created_at.cmp(&a.created_at).then(b_seq.cmp(a_seq)));
        Ok(orders.into_iter().map(|(_, header)| header).collect())
    }

    async fn advance_status(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> Result<bool, StoreError> {
        let row = Row::Order(order_id.clone());
        let mut ledger = acquire(&self.ledger, &self.released, AUTOCOMMIT, &row).await?;
        match ledger.orders.get_mut(order_id) {
            Some(header) if header.status == from => {
                header.status = to;
                if let Some(trade_no) = trade_no {
                    header.trade_no = Some(trade_no.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingTask>, StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let claimed: Vec<PendingTask> = ledger
            .outbox
            .iter_mut()
            .filter(|(_, row)| !row.completed && row.due_at <= now)
            .take(limit)
            .map(|(&id, row)| {
                row.attempts = row.attempts.saturating_add(1);
                row.due_at = lease_until;
                PendingTask {
                    id,
                    task: row.task.clone(),
                    attempts: row.attempts,
                }
            })
            .collect();
        Ok(claimed)
    }

    async fn complete_task(&self, id: i64) -> Result<(), StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let row = ledger
            .outbox
            .get_mut(&id)
            .ok_or_else(|| StoreError::Database(format!("no outbox row {id}")))?;
        row.completed = true;
        Ok(())
    }

    async fn retry_task(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let row = ledger
            .outbox
            .get_mut(&id)
            .ok_or_else(|| StoreError::Database(format!("no outbox row {id}")))?;
        row.last_error = Some(error.to_string());
        row.due_at = retry_at;
        Ok(())
    }
}

/// Transaction over an [`InMemoryOrderStore`]. Rolls back when dropped
/// without [`OrderTransaction::commit`].
pub struct InMemoryTransaction {
    id: u64,
    ledger: Arc<Mutex<Ledger>>,
    released: Arc<Notify>,
    gate: Option<Arc<Barrier>>,
    headers: Vec<OrderHeader>,
    lines: Vec<OrderLine>,
    /// Units taken per SKU, applied on commit
    taken: HashMap<SkuId, u32>,
    /// New status (and trade number) per order, applied on commit
    statuses: HashMap<OrderId, (OrderStatus, Option<String>)>,
    comments: HashMap<(OrderId, SkuId), String>,
    tasks: Vec<Task>,
    finished: bool,
}

impl InMemoryTransaction {
    /// Discard every private write and release this transaction's locks.
    fn discard(&mut self) {
        self.headers.clear();
        self.lines.clear();
        self.taken.clear();
        self.statuses.clear();
        self.comments.clear();
        self.tasks.clear();
        self.finished = true;

        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.release(self.id);
            ledger.rollbacks += 1;
        }
        self.released.notify_waiters();
    }

    /// Move every private write into the ledger.
    fn apply(&mut self, ledger: &mut Ledger) {
        for (sku_id, quantity) in self.taken.drain() {
            if let Some(sku) = ledger.skus.get_mut(&sku_id) {
                sku.stock = sku.stock.saturating_sub(quantity);
                sku.sales = sku.sales.saturating_add(quantity);
            }
        }
        for header in self.headers.drain(..) {
            ledger.next_sequence += 1;
            let sequence = ledger.next_sequence;
            ledger.placed.insert(header.order_id.clone(), sequence);
            ledger.orders.insert(header.order_id.clone(), header);
        }
        for line in self.lines.drain(..) {
            ledger.lines.entry(line.order_id.clone()).or_default().push(line);
        }
        for (order_id, (status, trade_no)) in self.statuses.drain() {
            if let Some(header) = ledger.orders.get_mut(&order_id) {
                header.status = status;
                if trade_no.is_some() {
                    header.trade_no = trade_no;
                }
            }
        }
        for ((order_id, sku_id), comment) in self.comments.drain() {
            if let Some(line) = ledger
                .lines
                .get_mut(&order_id)
                .and_then(|lines| lines.iter_mut().find(|l| l.sku_id == sku_id))
            {
                line.comment = Some(comment);
            }
        }
        for task in self.tasks.drain(..) {
            ledger.next_task += 1;
            let id = ledger.next_task;
            ledger.outbox.insert(
                id,
                OutboxRow {
                    task,
                    attempts: 0,
                    due_at: DateTime::<Utc>::MIN_UTC,
                    last_error: None,
                    completed: false,
                },
            );
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.discard();
        }
    }
}

impl OrderTransaction for InMemoryTransaction {
    async fn insert_header(&mut self, header: &OrderHeader) -> Result<(), StoreError> {
        let exists = lock(&self.ledger)?.orders.contains_key(&header.order_id)
            || self.headers.iter().any(|h| h.order_id == header.order_id);
        if exists {
            return Err(StoreError::Duplicate(format!("order {}", header.order_id)));
        }
        self.headers.push(header.clone());
        Ok(())
    }

    async fn load_sku(&mut self, sku_id: SkuId) -> Result<Option<Sku>, StoreError> {
        let mut sku = lock(&self.ledger)?.skus.get(&sku_id).cloned();
        if let (Some(sku), Some(&taken)) = (sku.as_mut(), self.taken.get(&sku_id)) {
            sku.stock = sku.stock.saturating_sub(taken);
            sku.sales = sku.sales.saturating_add(taken);
        }
        if let Some(gate) = self.gate.take() {
            gate.wait().await;
        }
        Ok(sku)
    }

    async fn decrement_stock(
        &mut self,
        sku_id: SkuId,
        expected_stock: u32,
        quantity: u32,
    ) -> Result<bool, StoreError> {
        {
            let mut ledger = lock(&self.ledger)?;
            if let Some(misses) = ledger.forced_conflicts.get_mut(&sku_id) {
                if *misses > 0 {
                    *misses -= 1;
                    return Ok(false);
                }
            }
        }

        let row = Row::Sku(sku_id);
        let ledger = Arc::clone(&self.ledger);
        let released = Arc::clone(&self.released);
        let mut guard = acquire(&ledger, &released, self.id, &row).await?;

        let Some(sku) = guard.skus.get(&sku_id) else {
            return Ok(false);
        };
        let taken = self.taken.get(&sku_id).copied().unwrap_or_default();
        let stock = sku.stock.saturating_sub(taken);
        if stock != expected_stock {
            return Ok(false);
        }
        if stock < quantity {
            return Err(StoreError::Database(format!(
                "check constraint: stock of sku {sku_id} would go negative"
            )));
        }
        guard.row_locks.insert(row, self.id);
        drop(guard);

        *self.taken.entry(sku_id).or_default() += quantity;
        Ok(true)
    }

    async fn insert_line(&mut self, line: &OrderLine) -> Result<(), StoreError> {
        if !self.headers.iter().any(|h| h.order_id == line.order_id) {
            return Err(StoreError::Database(format!(
                "foreign key: no header for order {}",
                line.order_id
            )));
        }
        self.lines.push(line.clone());
        Ok(())
    }

    async fn finalize_totals(
        &mut self,
        order_id: &OrderId,
        total_count: u32,
        total_price: Money,
    ) -> Result<(), StoreError> {
        let header = self
            .headers
            .iter_mut()
            .find(|h| &h.order_id == order_id)
            .ok_or_else(|| StoreError::Database(format!("no header for order {order_id}")))?;
        header.total_count = total_count;
        header.total_price = total_price;
        Ok(())
    }

    async fn set_comment(
        &mut self,
        order_id: &OrderId,
        sku_id: SkuId,
        comment: &str,
    ) -> Result<bool, StoreError> {
        let row = Row::Line(order_id.clone(), sku_id);
        let ledger = Arc::clone(&self.ledger);
        let released = Arc::clone(&self.released);
        let mut guard = acquire(&ledger, &released, self.id, &row).await?;

        let exists = guard
            .lines
            .get(order_id)
            .is_some_and(|lines| lines.iter().any(|l| l.sku_id == sku_id));
        if !exists {
            return Ok(false);
        }
        guard.row_locks.insert(row, self.id);
        drop(guard);

        self.comments.insert((order_id.clone(), sku_id), comment.to_string());
        Ok(true)
    }

    async fn advance_status(
        &mut self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> Result<bool, StoreError> {
        let row = Row::Order(order_id.clone());
        let ledger = Arc::clone(&self.ledger);
        let released = Arc::clone(&self.released);
        let mut guard = acquire(&ledger, &released, self.id, &row).await?;

        let current = match self.statuses.get(order_id) {
            Some((status, _)) => Some(*status),
            None => guard.orders.get(order_id).map(|header| header.status),
        };
        if current != Some(from) {
            return Ok(false);
        }
        guard.row_locks.insert(row, self.id);
        drop(guard);

        let trade_no = trade_no
            .map(str::to_string)
            .or_else(|| self.statuses.get(order_id).and_then(|(_, t)| t.clone()));
        self.statuses.insert(order_id.clone(), (to, trade_no));
        Ok(true)
    }

    async fn record_task(&mut self, task: &Task) -> Result<(), StoreError> {
        self.tasks.push(task.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let handle = Arc::clone(&self.ledger);
        let failed = {
            let mut ledger = lock(&handle)?;
            if ledger.fail_next_commit {
                ledger.fail_next_commit = false;
                true
            } else {
                self.apply(&mut ledger);
                ledger.release(self.id);
                ledger.commits += 1;
                false
            }
        };

        if failed {
            self.discard();
            return Err(StoreError::Database("commit failed".to_string()));
        }

        self.finished = true;
        self.released.notify_waiters();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.discard();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{header, sku};
    use std::time::Duration;

    fn placed(order_id: &str) -> Task {
        Task::OrderPlaced {
            order_id: OrderId::new(order_id),
            user_id: UserId::new(1),
        }
    }

    #[tokio::test]
    async fn uncommitted_decrements_are_private() {
        let store = InMemoryOrderStore::with_skus([sku(1, 5, 100)]);

        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.decrement_stock(SkuId::new(1), 5, 3).await.unwrap());
            assert_eq!(tx.load_sku(SkuId::new(1)).await.unwrap().unwrap().stock, 2);
            assert_eq!(store.sku(SkuId::new(1)).unwrap().stock, 5);
        }

        let restored = store.sku(SkuId::new(1)).unwrap();
        assert_eq!(restored.stock, 5);
        assert_eq!(restored.sales, 0);
        assert_eq!(store.transaction_counts(), (0, 1));
    }

    #[tokio::test]
    async fn committed_decrements_reach_the_ledger() {
        let store = InMemoryOrderStore::with_skus([sku(1, 5, 100)]);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.decrement_stock(SkuId::new(1), 5, 2).await.unwrap());
        assert!(tx.decrement_stock(SkuId::new(1), 3, 1).await.unwrap());
        tx.commit().await.unwrap();

        let sku = store.sku(SkuId::new(1)).unwrap();
        assert_eq!((sku.stock, sku.sales), (2, 3));
    }

    #[tokio::test]
    async fn blocked_decrement_succeeds_once_the_holder_rolls_back() {
        let store = InMemoryOrderStore::with_skus([sku(1, 5, 100)]);
        let mut holder = store.begin().await.unwrap();
        assert!(holder.decrement_stock(SkuId::new(1), 5, 5).await.unwrap());

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut tx = waiter_store.begin().await.unwrap();
            let taken = tx.decrement_stock(SkuId::new(1), 5, 2).await.unwrap();
            tx.commit().await.unwrap();
            taken
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        holder.rollback().await.unwrap();
        assert!(waiter.await.unwrap());
        assert_eq!(store.sku(SkuId::new(1)).unwrap().stock, 3);
    }

    #[tokio::test]
    async fn blocked_decrement_misses_once_the_holder_commits() {
        let store = InMemoryOrderStore::with_skus([sku(1, 5, 100)]);
        let mut holder = store.begin().await.unwrap();
        assert!(holder.decrement_stock(SkuId::new(1), 5, 1).await.unwrap());

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut tx = waiter_store.begin().await.unwrap();
            tx.decrement_stock(SkuId::new(1), 5, 2).await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        holder.commit().await.unwrap();
        assert!(!waiter.await.unwrap());
        assert_eq!(store.sku(SkuId::new(1)).unwrap().stock, 4);
    }

    #[tokio::test]
    async fn headers_are_invisible_until_commit() {
        let store = InMemoryOrderStore::new();
        let order = header("o-1");

        let mut tx = store.begin().await.unwrap();
        tx.insert_header(&order).await.unwrap();
        assert!(store.find_order(&order.order_id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(store.find_order(&order.order_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_expected_stock_matches_zero_rows() {
        let store = InMemoryOrderStore::with_skus([sku(1, 5, 100)]);
        let mut tx = store.begin().await.unwrap();

        assert!(!tx.decrement_stock(SkuId::new(1), 4, 1).await.unwrap());
        assert_eq!(store.sku(SkuId::new(1)).unwrap().stock, 5);
    }

    #[tokio::test]
    async fn injected_conflicts_are_consumed() {
        let store = InMemoryOrderStore::with_skus([sku(1, 5, 100)]);
        store.inject_conflicts(SkuId::new(1), 1).unwrap();
        let mut tx = store.begin().await.unwrap();

        assert!(!tx.decrement_stock(SkuId::new(1), 5, 1).await.unwrap());
        assert!(tx.decrement_stock(SkuId::new(1), 5, 1).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_order_ids_are_rejected() {
        let store = InMemoryOrderStore::new();
        let order = header("o-1");

        let mut tx = store.begin().await.unwrap();
        tx.insert_header(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_header(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn outbox_rows_appear_only_on_commit() {
        let store = InMemoryOrderStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.record_task(&placed("o-1")).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.pending_tasks().is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.record_task(&placed("o-2")).await.unwrap();
        tx.commit().await.unwrap();

        let pending = store.pending_tasks();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task, placed("o-2"));
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test]
    async fn claimed_rows_are_leased_until_retried_or_completed() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.record_task(&placed("o-1")).await.unwrap();
        tx.commit().await.unwrap();

        let now = Utc::now();
        let lease = now + chrono::Duration::seconds(30);

        let claimed = store.claim_tasks(now, lease, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);
        assert!(store.claim_tasks(now, lease, 10).await.unwrap().is_empty());

        store.retry_task(claimed[0].id, "smtp down", now).await.unwrap();
        assert_eq!(store.task_error(claimed[0].id).as_deref(), Some("smtp down"));
        let again = store.claim_tasks(now, lease, 10).await.unwrap();
        assert_eq!(again[0].attempts, 2);

        store.complete_task(again[0].id).await.unwrap();
        assert!(store.pending_tasks().is_empty());
        assert_eq!(store.completed_task_count(), 1);
    }

    #[tokio::test]
    async fn status_changes_apply_on_commit_with_the_trade_number() {
        let store = InMemoryOrderStore::new();
        let order = header("o-1");
        let mut tx = store.begin().await.unwrap();
        tx.insert_header(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(
            tx.advance_status(&order.order_id, OrderStatus::Created, OrderStatus::Paid, Some("T-1"))
                .await
                .unwrap()
        );
        assert_eq!(
            store.find_order(&order.order_id).await.unwrap().unwrap().status,
            OrderStatus::Created
        );
        tx.commit().await.unwrap();

        let stored = store.find_order(&order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(stored.trade_no.as_deref(), Some("T-1"));
    }
}
