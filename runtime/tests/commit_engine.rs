//! Integration tests for the commit engine against the in-memory store.
//!
//! Covers the reservation race, rollback on every failure path, price
//! snapshots, lock ordering, checked totals and post-commit cart cleanup.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{BUYER, Harness, OTHER_BUYER, direct, from_cart};
use std::time::Duration;
use storefront_core::cart::CartStore;
use storefront_core::store::OrderStore;
use storefront_core::task::Task;
use storefront_core::{AddressId, CommitError, Money, OrderStatus, PayMethod, RejectReason, SkuId};

#[tokio::test]
async fn commit_reserves_stock_and_writes_the_whole_order() {
    let h = Harness::with_skus(&[(1, 10, 350), (2, 4, 1000)]);

    let order_id = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "3"), (2, "1")]))
        .await
        .unwrap();

    assert_eq!(h.stock(1), (7, 3));
    assert_eq!(h.stock(2), (3, 1));

    let header = h.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(header.user_id, BUYER);
    assert_eq!(header.status, OrderStatus::Created);
    assert_eq!(header.total_count, 4);
    assert_eq!(header.total_price, Money::from_cents(2050));
    assert_eq!(header.transit_price, Money::from_cents(1000));
    assert_eq!(header.total_pay(), Money::from_cents(3050));

    let lines = h.store.order_lines(&order_id).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        h.outbox(),
        vec![Task::OrderPlaced {
            order_id,
            user_id: BUYER
        }]
    );
}

#[tokio::test]
async fn two_concurrent_buyers_cannot_oversell_the_last_units() {
    let h = Harness::with_skus(&[(7, 5, 1000)]);
    h.store.gate_first_reads(2).unwrap();

    let first = h.storefront.commit.clone();
    let second = h.storefront.commit.clone();
    let a = tokio::spawn(async move { first.commit(direct(PayMethod::Gateway, &[(7, "3")])).await });
    let b = tokio::spawn(async move { second.commit(direct(PayMethod::Gateway, &[(7, "3")])).await });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let committed = results.iter().filter(|r| r.is_ok()).count();
    let rejected: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

    assert_eq!(committed, 1);
    assert_eq!(rejected.len(), 1);
    assert_eq!(
        rejected[0],
        &CommitError::InsufficientStock {
            sku_id: SkuId::new(7),
            requested: 3,
            available: 2,
        }
    );
    assert_eq!(h.stock(7), (2, 3));
    assert_eq!(h.store.order_count(), 1);
}

#[tokio::test]
async fn unknown_sku_rolls_back_and_leaves_no_header() {
    let h = Harness::with_skus(&[(1, 10, 100)]);

    let err = h
        .storefront
        .commit
        .commit(direct(PayMethod::CashOnDelivery, &[(42, "2")]))
        .await
        .unwrap_err();

    assert_eq!(err, CommitError::SkuNotFound(SkuId::new(42)));
    assert_eq!(err.reason(), RejectReason::SkuNotFound);
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.store.line_count(), 0);
    assert!(h.outbox().is_empty());
}

#[tokio::test]
async fn failure_on_a_later_sku_restores_earlier_decrements() {
    let h = Harness::with_skus(&[(1, 10, 100), (2, 1, 100)]);

    let err = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "4"), (2, "2")]))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), RejectReason::InsufficientStock);
    assert_eq!(err.sku_id(), Some(SkuId::new(2)));
    assert_eq!(h.stock(1), (10, 0));
    assert_eq!(h.stock(2), (1, 0));
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.store.transaction_counts(), (0, 1));
}

#[tokio::test]
async fn lost_races_are_retried_until_the_decrement_lands() {
    let h = Harness::with_skus(&[(1, 10, 100)]);
    h.store.inject_conflicts(SkuId::new(1), 2).unwrap();

    h.storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "1")]))
        .await
        .unwrap();

    assert_eq!(h.stock(1), (9, 1));
}

#[tokio::test]
async fn exhausted_retries_are_reported_as_contention_not_stock() {
    let h = Harness::with_skus(&[(1, 10, 100)]);
    h.store.inject_conflicts(SkuId::new(1), 3).unwrap();

    let err = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "1")]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CommitError::ContentionExhausted {
            sku_id: SkuId::new(1),
            attempts: 3
        }
    );
    assert_ne!(err.reason(), RejectReason::InsufficientStock);
    assert_eq!(h.stock(1), (10, 0));
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn failed_commit_statement_surfaces_as_persistence_error() {
    let h = Harness::with_skus(&[(1, 10, 100)]);
    h.store.fail_next_commit().unwrap();

    let err = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "2")]))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), RejectReason::PersistenceError);
    assert_eq!(h.stock(1), (10, 0));
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn quantities_come_from_the_cart_and_consumed_entries_are_removed() {
    let h = Harness::with_skus(&[(1, 10, 100), (2, 10, 200), (3, 10, 300)]);
    for (sku, qty) in [(1, 2), (2, 1), (3, 5)] {
        h.carts.set(BUYER, SkuId::new(sku), qty).await.unwrap();
    }

    h.storefront
        .commit
        .commit(from_cart(PayMethod::Gateway, &[1, 2]))
        .await
        .unwrap();

    assert_eq!(h.stock(1), (8, 2));
    assert_eq!(h.stock(2), (9, 1));
    let remaining = h.carts.snapshot(BUYER);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.get(&SkuId::new(3)).map(String::as_str), Some("5"));
}

#[tokio::test]
async fn explicit_quantity_wins_over_the_cart_and_keeps_the_cart_entry() {
    let h = Harness::with_skus(&[(1, 10, 100)]);
    h.carts.set(BUYER, SkuId::new(1), 5).await.unwrap();

    h.storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "2")]))
        .await
        .unwrap();

    assert_eq!(h.stock(1), (8, 2));
    assert_eq!(h.carts.snapshot(BUYER).len(), 1);
}

#[tokio::test]
async fn cart_cleanup_failure_does_not_fail_a_committed_order() {
    let h = Harness::with_skus(&[(1, 10, 100)]);
    h.carts.set(BUYER, SkuId::new(1), 2).await.unwrap();
    h.carts.fail_removals(true);

    let order_id = h
        .storefront
        .commit
        .commit(from_cart(PayMethod::Gateway, &[1]))
        .await
        .unwrap();

    assert!(h.store.find_order(&order_id).await.unwrap().is_some());
    assert_eq!(h.carts.snapshot(BUYER).len(), 1);
}

#[tokio::test]
async fn malformed_or_missing_quantities_are_rejected_before_any_write() {
    let h = Harness::with_skus(&[(1, 10, 100), (2, 10, 100)]);
    h.carts.put_raw(BUYER, SkuId::new(1), "abc").unwrap();

    for request in [
        from_cart(PayMethod::Gateway, &[1]),
        from_cart(PayMethod::Gateway, &[2]),
        direct(PayMethod::Gateway, &[(2, "0")]),
        direct(PayMethod::Gateway, &[(2, "-1")]),
    ] {
        let err = h.storefront.commit.commit(request).await.unwrap_err();
        assert_eq!(err.reason(), RejectReason::InvalidQuantity);
        assert!(err.is_validation());
    }

    assert_eq!(h.store.transaction_counts(), (0, 0));
    assert_eq!(h.stock(1), (10, 0));
}

#[tokio::test]
async fn address_must_belong_to_the_buyer() {
    let h = Harness::with_skus(&[(1, 10, 100)]);
    let mut request = direct(PayMethod::Gateway, &[(1, "1")]);
    request.address_id = AddressId::new(2);

    let err = h.storefront.commit.commit(request).await.unwrap_err();

    assert_eq!(err, CommitError::InvalidAddress(AddressId::new(2)));
    assert_eq!(h.store.transaction_counts(), (0, 0));

    // the same address is valid for its owner
    let mut request = direct(PayMethod::Gateway, &[(1, "1")]);
    request.user_id = OTHER_BUYER;
    request.address_id = AddressId::new(2);
    assert!(h.storefront.commit.commit(request).await.is_ok());
}

#[tokio::test]
async fn empty_selection_is_missing_fields() {
    let h = Harness::with_skus(&[]);

    let err = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[]))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), RejectReason::MissingFields);
}

#[tokio::test]
async fn line_price_is_a_snapshot_of_the_decrement_cycle() {
    let h = Harness::with_skus(&[(1, 10, 500)]);

    let order_id = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "2")]))
        .await
        .unwrap();
    h.store.set_price(SkuId::new(1), Money::from_cents(900)).unwrap();

    let lines = h.store.order_lines(&order_id).await.unwrap();
    assert_eq!(lines[0].price, Money::from_cents(500));
    let header = h.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(header.total_price, Money::from_cents(1000));
}

#[tokio::test]
async fn duplicate_sku_ids_are_reserved_once() {
    let h = Harness::with_skus(&[(1, 10, 100)]);

    let order_id = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "2"), (1, "2")]))
        .await
        .unwrap();

    assert_eq!(h.stock(1), (8, 2));
    assert_eq!(h.store.order_lines(&order_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn order_ids_are_unique_for_rapid_commits_by_one_buyer() {
    let h = Harness::with_skus(&[(1, 100, 100)]);

    for _ in 0..20 {
        h.storefront
            .commit
            .commit(direct(PayMethod::Gateway, &[(1, "1")]))
            .await
            .unwrap();
    }

    assert_eq!(h.store.order_count(), 20);
    assert_eq!(h.stock(1), (80, 20));
}

#[tokio::test]
async fn buyers_listing_the_same_skus_in_opposite_orders_both_commit() {
    let h = Harness::with_skus(&[(1, 10, 100), (2, 10, 200)]);
    h.store.gate_first_reads(2).unwrap();

    let first = h.storefront.commit.clone();
    let second = h.storefront.commit.clone();
    let a = tokio::spawn(async move {
        first
            .commit(direct(PayMethod::CashOnDelivery, &[(1, "1"), (2, "1")]))
            .await
    });
    let b = tokio::spawn(async move {
        second
            .commit(direct(PayMethod::CashOnDelivery, &[(2, "1"), (1, "1")]))
            .await
    });

    let both = tokio::time::timeout(Duration::from_secs(5), async { (a.await.unwrap(), b.await.unwrap()) })
        .await
        .expect("row locks taken in the same order never wait in a cycle");

    assert!(both.0.is_ok());
    assert!(both.1.is_ok());
    assert_eq!(h.stock(1), (8, 2));
    assert_eq!(h.stock(2), (8, 2));
    assert_eq!(h.store.order_count(), 2);
}

#[tokio::test]
async fn overflowing_total_is_rejected_not_clamped() {
    let h = Harness::with_skus(&[(1, 10, u64::MAX / 2), (2, 10, u64::MAX - 1), (3, 10, 10)]);

    let err = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(1, "3")]))
        .await
        .unwrap_err();
    assert_eq!(err, CommitError::TotalOverflow(SkuId::new(1)));
    assert_eq!(err.reason(), RejectReason::PersistenceError);

    // sorted to 2 then 3: the total overflows when 3 is added
    let err = h
        .storefront
        .commit
        .commit(direct(PayMethod::Gateway, &[(3, "1"), (2, "1")]))
        .await
        .unwrap_err();
    assert_eq!(err, CommitError::TotalOverflow(SkuId::new(3)));

    assert_eq!(h.stock(1), (10, 0));
    assert_eq!(h.stock(2), (10, 0));
    assert_eq!(h.store.order_count(), 0);
    assert!(h.outbox().is_empty());
}
