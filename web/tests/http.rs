//! End-to-end HTTP tests over in-memory collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::payment::{CODE_SUCCESS, TRADE_SUCCESS};
use storefront_core::store::OrderStore;
use storefront_core::{SkuId, UserId};
use storefront_runtime::retry::RetryPolicy;
use storefront_runtime::{CommitSettings, Environment, PaymentSettings, RelaySettings, Settings, Storefront};
use storefront_testing::fixtures::{address, sku};
use storefront_testing::mocks::test_clock;
use storefront_testing::{InMemoryAddressBook, InMemoryCartStore, InMemoryOrderStore, ScriptedPaymentGateway};
use storefront_web::handlers::orders::CommitResponse;
use storefront_web::{AppState, build_router};

const BUYER: UserId = UserId::new(1);
const OTHER_BUYER: UserId = UserId::new(2);

struct App {
    server: TestServer,
    store: InMemoryOrderStore,
    carts: InMemoryCartStore,
}

fn settings() -> Settings {
    Settings {
        commit: CommitSettings {
            retry: RetryPolicy::builder()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(2))
                .build(),
            ..CommitSettings::default()
        },
        payment: PaymentSettings {
            poll_interval: Duration::from_millis(5),
            max_wait: Duration::from_millis(50),
            ..PaymentSettings::default()
        },
        relay: RelaySettings::default(),
    }
}

fn app_with_gateway(skus: &[(i64, u32, u64)], gateway: ScriptedPaymentGateway) -> App {
    let store = InMemoryOrderStore::with_skus(skus.iter().map(|&(id, stock, price)| sku(id, stock, price)));
    let carts = InMemoryCartStore::new();
    let addresses = InMemoryAddressBook::new();
    addresses.add(address(1, BUYER)).unwrap();
    addresses.add(address(2, OTHER_BUYER)).unwrap();

    let env = Environment::new(
        Arc::new(carts.clone()),
        Arc::new(addresses),
        Arc::new(gateway),
    )
    .with_clock(Arc::new(test_clock()));
    let storefront = Storefront::new(Arc::new(store.clone()), env, settings());

    App {
        server: TestServer::new(build_router(AppState::new(storefront))).expect("test server"),
        store,
        carts,
    }
}

fn app(skus: &[(i64, u32, u64)]) -> App {
    app_with_gateway(skus, ScriptedPaymentGateway::new())
}

fn user_header(user: UserId) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(&user.to_string()).expect("header value"),
    )
}

async fn post_as(app: &App, user: UserId, path: &str, body: &Value) -> TestResponse {
    let (name, value) = user_header(user);
    app.server.post(path).add_header(name, value).json(body).await
}

async fn get_as(app: &App, user: UserId, path: &str) -> TestResponse {
    let (name, value) = user_header(user);
    app.server.get(path).add_header(name, value).await
}

fn error_code(response: &TestResponse) -> String {
    response.json::<Value>()["code"].as_str().unwrap_or_default().to_string()
}

async fn commit_direct(app: &App, pay_method: &str, sku_id: i64, count: &str) -> TestResponse {
    post_as(
        app,
        BUYER,
        "/order/commit",
        &json!({
            "addr_id": "1",
            "pay_method": pay_method,
            "sku_ids": sku_id.to_string(),
            "count": count,
        }),
    )
    .await
}

#[tokio::test]
async fn health_answers_without_a_user() {
    let app = app(&[]);

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn requests_without_a_user_are_rejected() {
    let app = app(&[(1, 10, 100)]);

    let response = app
        .server
        .post("/order/commit")
        .json(&json!({ "addr_id": "1", "pay_method": "1", "sku_ids": "1" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&response), "not_authenticated");

    let (name, _) = user_header(BUYER);
    let response = app
        .server
        .get("/cart")
        .add_header(name, HeaderValue::from_static("0"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cart_add_then_view_reports_totals() {
    let app = app(&[(1, 10, 250), (2, 5, 1000)]);

    let response = post_as(&app, BUYER, "/cart/add", &json!({ "sku_id": "1", "count": "2" })).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["cart_count"], 1);

    let response = post_as(&app, BUYER, "/cart/add", &json!({ "sku_id": "2", "count": "1" })).await;
    assert_eq!(response.json::<Value>()["cart_count"], 2);

    let view = get_as(&app, BUYER, "/cart").await.json::<Value>();
    assert_eq!(view["total_count"], 3);
    assert_eq!(view["total_price"], 1500);
    assert_eq!(view["lines"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn cart_add_beyond_stock_is_a_conflict() {
    let app = app(&[(1, 3, 100)]);

    let response = post_as(&app, BUYER, "/cart/add", &json!({ "sku_id": "1", "count": "4" })).await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_code(&response), "insufficient_stock");
    assert!(app.carts.snapshot(BUYER).is_empty());
}

#[tokio::test]
async fn cart_update_and_delete_change_the_stored_entry() {
    let app = app(&[(1, 10, 100)]);
    post_as(&app, BUYER, "/cart/add", &json!({ "sku_id": "1", "count": "2" })).await;

    post_as(&app, BUYER, "/cart/update", &json!({ "sku_id": "1", "count": "7" }))
        .await
        .assert_status_ok();
    assert_eq!(app.carts.snapshot(BUYER).get(&SkuId::new(1)).map(String::as_str), Some("7"));

    let response = post_as(&app, BUYER, "/cart/delete", &json!({ "sku_id": "1" })).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["cart_count"], 0);
}

#[tokio::test]
async fn cart_form_without_sku_is_missing_fields() {
    let app = app(&[(1, 10, 100)]);

    let response = post_as(&app, BUYER, "/cart/add", &json!({ "count": "1" })).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "missing_fields");
}

#[tokio::test]
async fn commit_creates_the_order_and_moves_stock() {
    let app = app(&[(1, 10, 450)]);

    let response = commit_direct(&app, "1", 1, "2").await;

    response.assert_status(StatusCode::CREATED);
    let CommitResponse { order_id } = response.json();
    let header = app.store.find_order(&order_id).await.unwrap().expect("order persisted");
    assert_eq!(header.user_id, BUYER);
    let sku = app.store.sku(SkuId::new(1)).unwrap();
    assert_eq!((sku.stock, sku.sales), (8, 2));
}

#[tokio::test]
async fn commit_from_cart_clears_the_bought_entries() {
    let app = app(&[(1, 10, 100), (2, 10, 100)]);
    post_as(&app, BUYER, "/cart/add", &json!({ "sku_id": "1", "count": "3" })).await;
    post_as(&app, BUYER, "/cart/add", &json!({ "sku_id": "2", "count": "1" })).await;

    let response = post_as(
        &app,
        BUYER,
        "/order/commit",
        &json!({ "addr_id": "1", "pay_method": "1", "sku_ids": "1" }),
    )
    .await;

    response.assert_status(StatusCode::CREATED);
    let remaining = app.carts.snapshot(BUYER);
    assert!(!remaining.contains_key(&SkuId::new(1)));
    assert!(remaining.contains_key(&SkuId::new(2)));
}

#[tokio::test]
async fn commit_rejections_carry_their_reason_code() {
    let app = app(&[(1, 2, 100)]);

    let response = commit_direct(&app, "1", 1, "5").await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_code(&response), "insufficient_stock");
    assert_eq!(response.json::<Value>()["sku_id"], 1);

    let response = commit_direct(&app, "1", 99, "1").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&response), "sku_not_found");

    let response = commit_direct(&app, "9", 1, "1").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "invalid_pay_method");

    let response = post_as(&app, BUYER, "/order/commit", &json!({ "pay_method": "1", "sku_ids": "1" })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "missing_fields");

    let sku = app.store.sku(SkuId::new(1)).unwrap();
    assert_eq!((sku.stock, sku.sales), (2, 0));
}

#[tokio::test]
async fn commit_to_another_users_address_is_rejected() {
    let app = app(&[(1, 10, 100)]);

    let response = post_as(
        &app,
        BUYER,
        "/order/commit",
        &json!({ "addr_id": "2", "pay_method": "1", "sku_ids": "1", "count": "1" }),
    )
    .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&response), "invalid_address");
}

#[tokio::test]
async fn place_previews_without_reserving() {
    let app = app(&[(1, 10, 450)]);

    let response = post_as(&app, BUYER, "/order/place", &json!({ "sku_ids": "1", "count": "2" })).await;

    response.assert_status_ok();
    let sku = app.store.sku(SkuId::new(1)).unwrap();
    assert_eq!(sku.stock, 10);
}

#[tokio::test]
async fn order_detail_is_private_to_its_owner() {
    let app = app(&[(1, 10, 100)]);
    let CommitResponse { order_id } = commit_direct(&app, "1", 1, "1").await.json();
    let path = format!("/order/comment/{order_id}");

    get_as(&app, BUYER, &path).await.assert_status_ok();

    let response = get_as(&app, OTHER_BUYER, &path).await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_history_lists_the_callers_orders_newest_first() {
    let app = app(&[(1, 10, 100), (2, 10, 250)]);
    let CommitResponse { order_id: first } = commit_direct(&app, "1", 1, "1").await.json();
    let CommitResponse { order_id: second } = commit_direct(&app, "3", 2, "2").await.json();

    let response = get_as(&app, BUYER, "/user/order").await;

    response.assert_status_ok();
    let history: Value = response.json();
    let orders = history.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["header"]["order_id"], json!(second.as_str()));
    assert_eq!(orders[1]["header"]["order_id"], json!(first.as_str()));
    assert_eq!(orders[0]["lines"].as_array().unwrap().len(), 1);
    assert!(orders[1]["status_name"].is_string());

    let response = get_as(&app, OTHER_BUYER, "/user/order").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!([]));

    app.server.get("/user/order").await.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn comments_require_a_delivered_order() {
    let app = app(&[(1, 10, 100)]);
    let CommitResponse { order_id } = commit_direct(&app, "1", 1, "1").await.json();

    let response = post_as(
        &app,
        BUYER,
        &format!("/order/comment/{order_id}"),
        &json!({ "comments": [{ "sku_id": 1, "content": "great" }] }),
    )
    .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_code(&response), "invalid_transition");
}

#[tokio::test]
async fn gateway_order_can_be_paid_and_confirmed() {
    let gateway = ScriptedPaymentGateway::new().then_answer(CODE_SUCCESS, Some(TRADE_SUCCESS), Some("T-1"));
    let app = app_with_gateway(&[(1, 10, 100)], gateway);
    let CommitResponse { order_id } = commit_direct(&app, "3", 1, "1").await.json();

    let response = post_as(&app, BUYER, "/order/pay", &json!({ "order_id": order_id })).await;
    response.assert_status_ok();
    let pay_url = response.json::<Value>()["pay_url"].as_str().unwrap_or_default().to_string();
    assert!(pay_url.ends_with(order_id.as_str()));

    let response = post_as(&app, BUYER, "/order/check", &json!({ "order_id": order_id })).await;
    response.assert_status_ok();
    let confirmation = response.json::<Value>();
    assert_eq!(confirmation["trade_no"], "T-1");
    assert_eq!(confirmation["newly_paid"], true);
}

#[tokio::test]
async fn cash_orders_are_not_payable_online() {
    let app = app(&[(1, 10, 100)]);
    let CommitResponse { order_id } = commit_direct(&app, "1", 1, "1").await.json();

    let response = post_as(&app, BUYER, "/order/pay", &json!({ "order_id": order_id })).await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_code(&response), "not_payable");
}

#[tokio::test]
async fn responses_echo_a_correlation_id() {
    let app = app(&[]);

    let response = get_as(&app, BUYER, "/cart").await;

    response.assert_status_ok();
    assert!(response.headers().contains_key("x-correlation-id"));
}
