//! `PostgreSQL` storage for the storefront.
//!
//! This crate provides the production implementations of the
//! `storefront-core` storage traits:
//!
//! - [`PostgresOrderStore`]: inventory ledger and order aggregate behind
//!   [`OrderStore`](storefront_core::store::OrderStore), with the stock
//!   compare-and-swap done by a conditional `UPDATE`, plus the task outbox
//!   written in the same transaction
//! - [`PostgresAddressBook`]: read-only address lookups
//!
//! Transactions run at READ COMMITTED so that every re-read inside a commit
//! sees the most recently committed stock.
//!
//! # Example
//!
//! ```ignore
//! use storefront_postgres::{PostgresOrderStore, connect};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/storefront", 10).await?;
//!     let store = PostgresOrderStore::new(pool);
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod address_book;
mod convert;
mod order_store;

pub use address_book::PostgresAddressBook;
pub use order_store::{PgOrderTransaction, PostgresOrderStore};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use storefront_core::error::StoreError;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to connect to database: {e}")))?;

    tracing::info!(max_connections, "Database pool ready");
    Ok(pool)
}

/// Run the bundled migrations.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    Ok(())
}
