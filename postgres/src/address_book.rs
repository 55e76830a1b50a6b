//! `PostgreSQL` address lookups.

use crate::convert::{address_from_row, db_error};
use sqlx::PgPool;
use storefront_core::BoxFuture;
use storefront_core::address::{Address, AddressBook};
use storefront_core::error::StoreError;
use storefront_core::{AddressId, UserId};

const ADDRESS_COLUMNS: &str = "id, user_id, receiver, addr, zip_code, phone, is_default";

/// Address book over the `addresses` table.
#[derive(Clone)]
pub struct PostgresAddressBook {
    pool: PgPool,
}

impl PostgresAddressBook {
    /// Address book over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an address and return its id. Address management is owned
    /// elsewhere; this exists for seeding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub async fn insert(&self, address: &Address) -> Result<AddressId, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO addresses (user_id, receiver, addr, zip_code, phone, is_default)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(address.user_id.get())
        .bind(&address.receiver)
        .bind(&address.addr)
        .bind(address.zip_code.as_deref())
        .bind(&address.phone)
        .bind(address.is_default)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("insert address", e))?;

        Ok(AddressId::new(id))
    }
}

impl AddressBook for PostgresAddressBook {
    fn get(&self, address_id: AddressId, user_id: UserId) -> BoxFuture<'_, Result<Option<Address>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1 AND user_id = $2"
            ))
            .bind(address_id.get())
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get address", e))?;

            row.as_ref().map(address_from_row).transpose()
        })
    }

    fn list(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Address>, StoreError>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, id ASC"
            ))
            .bind(user_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list addresses", e))?;

            rows.iter().map(address_from_row).collect()
        })
    }
}
