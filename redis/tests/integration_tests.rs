//! Integration tests for `RedisCartStore` using testcontainers.
//!
//! # Requirements
//!
//! Docker must be running to execute these tests.

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages

use storefront_core::cart::{CartStore, cart_key};
use storefront_core::{SkuId, UserId};
use storefront_redis::RedisCartStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

const BUYER: UserId = UserId::new(1);
const OTHER: UserId = UserId::new(2);

/// Start a Redis container and connect a cart store to it.
///
/// # Panics
/// Panics if container setup fails (test environment issue).
async fn setup() -> (ContainerAsync<Redis>, RedisCartStore, String) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");
    let url = format!("redis://127.0.0.1:{port}");

    let mut retries = 0;
    loop {
        if let Ok(store) = RedisCartStore::new(&url).await {
            if store.ping().await.is_ok() {
                return (container, store, url);
            }
        }
        assert!(retries < 30, "Failed to connect after {retries} retries");
        retries += 1;
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
    }
}

#[tokio::test]
async fn test_set_get_and_count() {
    let (_container, carts, _) = setup().await;

    carts.set(BUYER, SkuId::new(1), 2).await.expect("set");
    carts.set(BUYER, SkuId::new(2), 5).await.expect("set");
    carts.set(BUYER, SkuId::new(1), 3).await.expect("set");

    assert_eq!(carts.get(BUYER, SkuId::new(1)).await.expect("get").as_deref(), Some("3"));
    assert_eq!(carts.get(BUYER, SkuId::new(9)).await.expect("get"), None);
    assert_eq!(carts.count(BUYER).await.expect("count"), 2);
    assert_eq!(carts.count(OTHER).await.expect("count"), 0);
}

#[tokio::test]
async fn test_remove_many_keeps_untouched_entries() {
    let (_container, carts, _) = setup().await;
    for sku in 1..=3 {
        carts.set(BUYER, SkuId::new(sku), 1).await.expect("set");
    }

    carts
        .remove_many(BUYER, vec![SkuId::new(1), SkuId::new(3)])
        .await
        .expect("remove_many");
    carts.remove_many(BUYER, Vec::new()).await.expect("empty remove_many");

    let left = carts.get_all(BUYER).await.expect("get_all");
    assert_eq!(left.keys().copied().collect::<Vec<_>>(), vec![SkuId::new(2)]);
}

#[tokio::test]
async fn test_raw_values_are_returned_unvalidated() {
    let (_container, carts, url) = setup().await;

    // Write a malformed quantity the way a stale client might.
    let client = redis::Client::open(url.as_str()).expect("client");
    let mut conn = client.get_multiplexed_async_connection().await.expect("conn");
    let _: () = redis::cmd("HSET")
        .arg(cart_key(BUYER))
        .arg("4")
        .arg("abc")
        .arg("not-a-sku")
        .arg("1")
        .query_async(&mut conn)
        .await
        .expect("hset");

    let entries = carts.get_all(BUYER).await.expect("get_all");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries.get(&SkuId::new(4)).map(String::as_str), Some("abc"));
}

#[tokio::test]
async fn test_remove_single_entry() {
    let (_container, carts, _) = setup().await;
    carts.set(BUYER, SkuId::new(1), 1).await.expect("set");

    carts.remove(BUYER, SkuId::new(1)).await.expect("remove");

    assert_eq!(carts.count(BUYER).await.expect("count"), 0);
}
