//! Router configuration for the storefront.

use crate::handlers::{cart, health, orders, payment};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use storefront_core::store::OrderStore;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// | route | handler |
/// |-------|---------|
/// | `POST /cart/add`, `/cart/update`, `/cart/delete` | cart mutations |
/// | `GET /cart` | cart page |
/// | `POST /order/place` | checkout preview |
/// | `POST /order/commit` | order commit |
/// | `POST /order/pay`, `/order/check` | gateway payment |
/// | `GET /user/order` | order history |
/// | `GET`/`POST /order/comment/:order_id` | detail and comments |
/// | `GET /health`, `/metrics` | operations |
pub fn build_router<S: OrderStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics::<S>))
        // Cart
        .route("/cart", get(cart::view::<S>))
        .route("/cart/add", post(cart::add::<S>))
        .route("/cart/update", post(cart::update::<S>))
        .route("/cart/delete", post(cart::delete::<S>))
        // Checkout
        .route("/order/place", post(orders::place::<S>))
        .route("/order/commit", post(orders::commit::<S>))
        // Payment
        .route("/order/pay", post(payment::pay::<S>))
        .route("/order/check", post(payment::check::<S>))
        // History and after delivery
        .route("/user/order", get(orders::history::<S>))
        .route(
            "/order/comment/:order_id",
            get(orders::detail::<S>).post(orders::comment::<S>),
        )
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
