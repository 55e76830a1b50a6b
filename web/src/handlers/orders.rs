//! Order endpoints.
//!
//! - `POST /order/place` - checkout preview at current prices
//! - `POST /order/commit` - turn the selection into a durable order
//! - `GET /user/order` - order history of the caller, newest first
//! - `GET /order/comment/:order_id` - order detail, for the comment page
//! - `POST /order/comment/:order_id` - store line comments, close the order

use crate::error::AppError;
use crate::extractors::{AuthenticatedUser, CorrelationId};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use storefront_core::store::OrderStore;
use storefront_core::view::{OrderDetailView, PlacePreview};
use storefront_core::{OrderId, SkuId};
use storefront_runtime::CommitForm;
use storefront_runtime::commit::parse_sku_ids;

/// Request body of `POST /order/place`.
#[derive(Debug, Default, Deserialize)]
pub struct PlaceForm {
    /// Comma-separated SKU ids
    #[serde(default)]
    pub sku_ids: Option<String>,
    /// Direct-buy quantity, only used for a single SKU
    #[serde(default)]
    pub count: Option<String>,
}

/// Response of a successful commit.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    /// The new order
    pub order_id: OrderId,
}

/// One comment of `POST /order/comment/:order_id`.
#[derive(Debug, Deserialize)]
pub struct CommentEntry {
    /// Commented SKU
    pub sku_id: SkuId,
    /// Comment text
    pub content: String,
}

/// Request body of `POST /order/comment/:order_id`.
#[derive(Debug, Deserialize)]
pub struct CommentForm {
    /// One entry per commented line
    #[serde(default)]
    pub comments: Vec<CommentEntry>,
}

/// Response of `POST /order/comment/:order_id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    /// Lines that received a comment
    pub stored: usize,
}

/// Checkout preview. Nothing is reserved.
///
/// # Errors
///
/// `missing_fields` for an empty or malformed SKU list, `sku_not_found`
/// or `invalid_quantity` for the first offending SKU.
pub async fn place<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(form): Json<PlaceForm>,
) -> Result<Json<PlacePreview>, AppError> {
    let sku_ids = parse_sku_ids(form.sku_ids.as_deref())?;
    let preview = state
        .storefront
        .orders
        .place_preview(user_id, &sku_ids, form.count.as_deref())
        .await?;
    Ok(Json(preview))
}

/// Commit an order.
///
/// Returns `201 Created` with the order id. Every rejection carries its
/// reason code in the error body.
///
/// # Errors
///
/// Any [`storefront_core::RejectReason`].
pub async fn commit<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(form): Json<CommitForm>,
) -> Result<(StatusCode, Json<CommitResponse>), AppError> {
    let request = form.into_request(user_id)?;

    match state.storefront.commit.commit(request).await {
        Ok(order_id) => {
            tracing::info!(
                correlation_id = %correlation_id.0,
                order_id = %order_id,
                "Order committed"
            );
            Ok((StatusCode::CREATED, Json(CommitResponse { order_id })))
        }
        Err(err) => {
            tracing::info!(
                correlation_id = %correlation_id.0,
                reason = %err.reason(),
                "Order rejected"
            );
            Err(err.into())
        }
    }
}

/// Order history of the calling user, newest first.
///
/// # Errors
///
/// `500`/`503` when the store fails.
pub async fn history<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<OrderDetailView>>, AppError> {
    Ok(Json(state.storefront.orders.list(user_id).await?))
}

/// Order detail as shown on the comment page.
///
/// # Errors
///
/// `404` for unknown orders and for orders of other users.
pub async fn detail<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderDetailView>, AppError> {
    let order_id = OrderId::new(order_id);
    Ok(Json(state.storefront.orders.detail(user_id, &order_id).await?))
}

/// Store per-line comments and move the order to reviewed.
///
/// # Errors
///
/// `404` if the order is not the user's, `409 invalid_transition` unless
/// it has been delivered.
pub async fn comment<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(order_id): Path<String>,
    Json(form): Json<CommentForm>,
) -> Result<Json<CommentResponse>, AppError> {
    let order_id = OrderId::new(order_id);
    let comments = form
        .comments
        .into_iter()
        .map(|entry| (entry.sku_id, entry.content))
        .collect();

    let stored = state
        .storefront
        .orders
        .comment(user_id, &order_id, comments)
        .await?;
    Ok(Json(CommentResponse { stored }))
}
