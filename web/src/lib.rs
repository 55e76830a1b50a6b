//! Axum HTTP surface for the storefront.
//!
//! Handlers are thin: they extract the authenticated user and the request
//! body, call one storefront service, and map its error to an HTTP status
//! plus a stable error code.
//!
//! # Request Flow
//!
//! 1. **Correlation id** assigned by [`middleware::correlation_id_layer`]
//! 2. **User** read from `X-User-Id` by [`extractors::AuthenticatedUser`]
//! 3. **Service call** on [`storefront_runtime::Storefront`]
//! 4. **Errors** rendered by [`AppError`] as `{ "code", "message" }`
//!
//! # Example
//!
//! ```ignore
//! use storefront_web::{AppState, routes::build_router};
//!
//! let app = build_router(AppState::new(storefront));
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

// Re-export key types for convenience
pub use config::{Config, ConfigError};
pub use error::AppError;
pub use extractors::{AuthenticatedUser, CorrelationId, USER_ID_HEADER};
pub use gateway::HttpPaymentGateway;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use routes::build_router;
pub use state::AppState;
