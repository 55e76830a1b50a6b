//! Column conversions and error mapping.

use sqlx::Row;
use sqlx::postgres::PgRow;
use storefront_core::address::Address;
use storefront_core::error::StoreError;
use storefront_core::task::{PendingTask, Task};
use storefront_core::{
    AddressId, CategoryId, GoodsId, Money, OrderHeader, OrderId, OrderLine, OrderStatus, PayMethod, Sku, SkuId,
    UserId,
};

/// Classify a driver error.
pub fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(format!("{context}: {db_err}"))
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{context}: {e}"))
        }
        _ => StoreError::Database(format!("{context}: {e}")),
    }
}

pub fn money_to_db(money: Money) -> Result<i64, StoreError> {
    i64::try_from(money.cents()).map_err(|_| StoreError::Database(format!("amount {money} out of range")))
}

fn money_from_db(cents: i64, column: &str) -> Result<Money, StoreError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Corrupt(format!("negative {column}: {cents}")))
}

fn count_from_db(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

pub fn sku_from_row(row: &PgRow) -> Result<Sku, StoreError> {
    Ok(Sku {
        id: SkuId::new(get(row, "id")?),
        goods_id: GoodsId::new(get(row, "goods_id")?),
        type_id: CategoryId::new(get(row, "type_id")?),
        name: get(row, "name")?,
        unit: get(row, "unit")?,
        price: money_from_db(get(row, "price_cents")?, "price_cents")?,
        stock: count_from_db(get(row, "stock")?, "stock")?,
        sales: count_from_db(get(row, "sales")?, "sales")?,
    })
}

pub fn header_from_row(row: &PgRow) -> Result<OrderHeader, StoreError> {
    let pay_code: i16 = get(row, "pay_method")?;
    let status_code: i16 = get(row, "order_status")?;

    Ok(OrderHeader {
        order_id: OrderId::new(get::<String>(row, "order_id")?),
        user_id: UserId::new(get(row, "user_id")?),
        address_id: AddressId::new(get(row, "address_id")?),
        pay_method: PayMethod::from_code(pay_code)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown pay_method {pay_code}")))?,
        total_count: count_from_db(get(row, "total_count")?, "total_count")?,
        total_price: money_from_db(get(row, "total_price_cents")?, "total_price_cents")?,
        transit_price: money_from_db(get(row, "transit_price_cents")?, "transit_price_cents")?,
        status: OrderStatus::from_code(status_code)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown order_status {status_code}")))?,
        trade_no: get(row, "trade_no")?,
        created_at: get(row, "created_at")?,
    })
}

pub fn line_from_row(row: &PgRow) -> Result<OrderLine, StoreError> {
    Ok(OrderLine {
        order_id: OrderId::new(get::<String>(row, "order_id")?),
        sku_id: SkuId::new(get(row, "sku_id")?),
        count: count_from_db(get(row, "count")?, "count")?,
        price: money_from_db(get(row, "price_cents")?, "price_cents")?,
        comment: get(row, "comment")?,
    })
}

/// Outbox payload column.
pub fn task_to_db(task: &Task) -> Result<String, StoreError> {
    serde_json::to_string(task).map_err(|e| StoreError::Database(format!("encode task: {e}")))
}

pub fn pending_task_from_row(row: &PgRow) -> Result<PendingTask, StoreError> {
    let payload: String = get(row, "payload")?;
    let task = serde_json::from_str(&payload)
        .map_err(|e| StoreError::Corrupt(format!("outbox payload: {e}")))?;

    Ok(PendingTask {
        id: get(row, "id")?,
        task,
        attempts: count_from_db(get(row, "attempts")?, "attempts")?,
    })
}

pub fn address_from_row(row: &PgRow) -> Result<Address, StoreError> {
    Ok(Address {
        id: AddressId::new(get(row, "id")?),
        user_id: UserId::new(get(row, "user_id")?),
        receiver: get(row, "receiver")?,
        addr: get(row, "addr")?,
        zip_code: get(row, "zip_code")?,
        phone: get(row, "phone")?,
        is_default: get(row, "is_default")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_transient() {
        assert!(matches!(
            db_error("begin", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            db_error("select", sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn amounts_beyond_bigint_are_refused() {
        assert!(money_to_db(Money::from_cents(u64::MAX)).is_err());
        assert_eq!(money_to_db(Money::from_cents(1250)), Ok(1250));
    }

    #[test]
    fn task_payload_is_tagged_json() {
        let task = Task::OrderPlaced {
            order_id: OrderId::new("o-1"),
            user_id: UserId::new(7),
        };

        let payload = task_to_db(&task).unwrap_or_default();

        assert_eq!(payload, r#"{"type":"order_placed","order_id":"o-1","user_id":7}"#);
        assert_eq!(serde_json::from_str::<Task>(&payload).ok(), Some(task));
    }

    #[test]
    fn negative_columns_are_corrupt() {
        assert!(matches!(money_from_db(-1, "price_cents"), Err(StoreError::Corrupt(_))));
        assert!(matches!(count_from_db(-3, "stock"), Err(StoreError::Corrupt(_))));
        assert_eq!(count_from_db(7, "stock"), Ok(7));
    }
}
