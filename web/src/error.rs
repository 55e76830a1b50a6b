//! Error types for web handlers.
//!
//! Domain errors convert into [`AppError`], which renders as a JSON body
//! `{ "code": ..., "message": ... }`. For commit rejections `code` is the
//! stable [`RejectReason`] string, so clients can branch on it.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use storefront_core::payment::GatewayError;
use storefront_core::{CartError, CommitError, OrderError, PaymentError, RejectReason, SkuId, StoreError};

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<Json<Data>, AppError> {
///     let order_id = state.storefront.commit.commit(request).await?;
///     Ok(Json(order_id))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// SKU the error is about, when there is one
    sku_id: Option<SkuId>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            sku_id: None,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the SKU the error is about.
    #[must_use]
    pub fn with_sku(mut self, sku_id: Option<SkuId>) -> Self {
        self.sku_id = sku_id;
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Error code sent to the client.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create an error carrying a commit reject reason.
    #[must_use]
    pub fn rejected(status: StatusCode, reason: RejectReason, message: impl Into<String>) -> Self {
        Self::new(status, message.into(), reason.as_str().to_string())
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// Create a 401 error for a request without a logged-in user.
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::rejected(
            StatusCode::UNAUTHORIZED,
            RejectReason::NotAuthenticated,
            CommitError::NotAuthenticated.to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// Create a 502 error for a gateway that misbehaved.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message.into(), "BAD_GATEWAY".to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Offending SKU.
    #[serde(skip_serializing_if = "Option::is_none")]
    sku_id: Option<SkuId>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log internal errors
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            sku_id: self.sku_id,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Store failures never leak their detail to clients.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let public = match err {
            StoreError::Unavailable(_) => Self::unavailable("Storage is temporarily unavailable"),
            _ => Self::internal("An internal error occurred"),
        };
        public.with_source(anyhow::Error::new(err))
    }
}

impl From<CommitError> for AppError {
    fn from(err: CommitError) -> Self {
        let reason = err.reason();
        let status = match reason {
            RejectReason::NotAuthenticated => StatusCode::UNAUTHORIZED,
            RejectReason::MissingFields | RejectReason::InvalidPayMethod => StatusCode::BAD_REQUEST,
            RejectReason::InvalidAddress | RejectReason::InvalidQuantity | RejectReason::SkuNotFound => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RejectReason::InsufficientStock | RejectReason::ContentionExhausted => StatusCode::CONFLICT,
            RejectReason::PersistenceError => match &err {
                CommitError::Persistence(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        if let CommitError::Persistence(store) = err {
            return Self::rejected(status, reason, "The order could not be placed, please try again")
                .with_source(anyhow::Error::new(store));
        }
        Self::rejected(status, reason, err.to_string()).with_sku(err.sku_id())
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::SkuNotFound(sku_id) => {
                Self::rejected(StatusCode::UNPROCESSABLE_ENTITY, RejectReason::SkuNotFound, err.to_string())
                    .with_sku(Some(sku_id))
            }
            CartError::InvalidQuantity(_) => {
                Self::rejected(StatusCode::UNPROCESSABLE_ENTITY, RejectReason::InvalidQuantity, err.to_string())
            }
            CartError::InsufficientStock { sku_id, .. } => {
                Self::rejected(StatusCode::CONFLICT, RejectReason::InsufficientStock, err.to_string())
                    .with_sku(Some(sku_id))
            }
            CartError::Store(store) => store.into(),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(ref order_id) => Self::not_found("Order", order_id),
            OrderError::InvalidTransition { .. } => Self::new(
                StatusCode::CONFLICT,
                err.to_string(),
                "invalid_transition".to_string(),
            ),
            OrderError::SkuNotFound(sku_id) => {
                Self::rejected(StatusCode::UNPROCESSABLE_ENTITY, RejectReason::SkuNotFound, err.to_string())
                    .with_sku(Some(sku_id))
            }
            OrderError::InvalidQuantity { sku_id, .. } => {
                Self::rejected(StatusCode::UNPROCESSABLE_ENTITY, RejectReason::InvalidQuantity, err.to_string())
                    .with_sku(Some(sku_id))
            }
            OrderError::Store(store) => store.into(),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotPayable(_) => Self::new(
                StatusCode::CONFLICT,
                err.to_string(),
                "not_payable".to_string(),
            ),
            PaymentError::Declined { .. } => Self::new(
                StatusCode::PAYMENT_REQUIRED,
                err.to_string(),
                "payment_declined".to_string(),
            ),
            PaymentError::TimedOut(_) => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                err.to_string(),
                "payment_pending".to_string(),
            ),
            PaymentError::Gateway(gateway) => {
                let public = match gateway {
                    GatewayError::Transport(_) => Self::unavailable("Payment gateway is unreachable"),
                    GatewayError::Protocol(_) => Self::bad_gateway("Payment gateway answered unexpectedly"),
                };
                public.with_source(anyhow::Error::new(gateway))
            }
            PaymentError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::OrderId;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_commit_rejections_carry_reason_codes() {
        let err = AppError::from(CommitError::InsufficientStock {
            sku_id: SkuId::new(7),
            requested: 3,
            available: 2,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "insufficient_stock");
        assert_eq!(err.sku_id, Some(SkuId::new(7)));

        let err = AppError::from(CommitError::ContentionExhausted {
            sku_id: SkuId::new(7),
            attempts: 3,
        });
        assert_eq!(err.code(), "contention_exhausted");

        let err = AppError::from(CommitError::MissingFields("addr_id"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "missing_fields");
    }

    #[test]
    fn test_persistence_detail_is_not_exposed() {
        let err = AppError::from(CommitError::Persistence(StoreError::Database(
            "relation skus does not exist".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "persistence_error");
        assert!(!err.message.contains("skus"));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_unavailable_store_during_commit_is_503_with_reason() {
        let err = AppError::from(CommitError::Persistence(StoreError::Unavailable(
            "cart store: connection refused".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "persistence_error");
        assert!(!err.message.contains("refused"));
    }

    #[test]
    fn test_unavailable_store_is_503() {
        let err = AppError::from(CartError::Store(StoreError::Unavailable("redis down".to_string())));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_foreign_orders_look_missing() {
        let err = AppError::from(OrderError::NotFound(OrderId::new("o-1")));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "[NOT_FOUND] Order with id o-1 not found");
    }

    #[test]
    fn test_pending_payment_is_gateway_timeout() {
        let err = AppError::from(PaymentError::TimedOut(OrderId::new("o-1")));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "payment_pending");
    }
}
