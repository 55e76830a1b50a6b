//! Redis-based cart store.
//!
//! # Architecture
//!
//! Each cart is one Redis hash:
//! - **Key**: `cart_{user_id}`
//! - **Field**: SKU id
//! - **Value**: desired quantity, as a decimal string
//!
//! Redis offers no transactional link with the order store. Quantities are
//! handed back raw and validated by whoever reads them.
//!
//! # Example
//!
//! ```no_run
//! use storefront_redis::RedisCartStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let carts = RedisCartStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::collections::{BTreeMap, HashMap};
use storefront_core::BoxFuture;
use storefront_core::cart::{CartStore, cart_key};
use storefront_core::error::StoreError;
use storefront_core::{SkuId, UserId};

/// Map a Redis error: connection trouble is transient, the rest is not.
fn store_error(context: &str, e: &RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable(format!("{context}: {e}"))
    } else {
        StoreError::Database(format!("{context}: {e}"))
    }
}

/// Cart store with one Redis hash per user.
///
/// Cloning is cheap: clones share the `ConnectionManager`, which reconnects
/// on its own after a dropped connection.
#[derive(Clone)]
pub struct RedisCartStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisCartStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if Redis cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}")))?;

        Ok(Self { conn_manager })
    }

    /// Liveness check.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if `PING` fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error("ping", &e))?;
        Ok(())
    }
}

impl CartStore for RedisCartStore {
    fn set(&self, user_id: UserId, sku_id: SkuId, quantity: u32) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .hset(cart_key(user_id), sku_id.get(), quantity)
                .await
                .map_err(|e| store_error("cart set", &e))?;
            Ok(())
        })
    }

    fn get(&self, user_id: UserId, sku_id: SkuId) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.hget(cart_key(user_id), sku_id.get())
                .await
                .map_err(|e| store_error("cart get", &e))
        })
    }

    fn get_all(&self, user_id: UserId) -> BoxFuture<'_, Result<BTreeMap<SkuId, String>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let raw: HashMap<String, String> = conn
                .hgetall(cart_key(user_id))
                .await
                .map_err(|e| store_error("cart get_all", &e))?;

            let mut entries = BTreeMap::new();
            for (field, quantity) in raw {
                match field.parse::<SkuId>() {
                    Ok(sku_id) => {
                        entries.insert(sku_id, quantity);
                    }
                    Err(_) => {
                        tracing::warn!(user_id = %user_id, field = %field, "Ignoring non-numeric cart field");
                    }
                }
            }
            Ok(entries)
        })
    }

    fn remove(&self, user_id: UserId, sku_id: SkuId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .hdel(cart_key(user_id), sku_id.get())
                .await
                .map_err(|e| store_error("cart remove", &e))?;
            Ok(())
        })
    }

    fn remove_many(&self, user_id: UserId, sku_ids: Vec<SkuId>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if sku_ids.is_empty() {
                return Ok(());
            }
            let fields: Vec<i64> = sku_ids.iter().map(|id| id.get()).collect();
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .hdel(cart_key(user_id), fields)
                .await
                .map_err(|e| store_error("cart remove_many", &e))?;

            tracing::debug!(user_id = %user_id, removed = sku_ids.len(), "Cart entries removed");
            Ok(())
        })
    }

    fn count(&self, user_id: UserId) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.hlen(cart_key(user_id))
                .await
                .map_err(|e| store_error("cart count", &e))
        })
    }
}
