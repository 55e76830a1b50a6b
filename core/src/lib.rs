//! # Storefront Core
//!
//! Domain types and collaborator traits for the storefront order-commit
//! engine.
//!
//! This crate has no I/O of its own. It defines what the runtime operates on
//! and the seams where infrastructure plugs in:
//!
//! - **Inventory ledger + order aggregate**: [`store::OrderStore`] and
//!   [`store::OrderTransaction`] (PostgreSQL in production)
//! - **Cart**: [`cart::CartStore`] (Redis hash per user in production)
//! - **Addresses**: [`address::AddressBook`]
//! - **Payment gateway**: [`payment::PaymentGateway`]
//! - **Deferred work**: outbox rows written through
//!   [`store::OrderTransaction::record_task`]
//! - **Time**: [`environment::Clock`]
//!
//! ## Invariants
//!
//! - `stock` never goes negative and `sales` never decreases
//! - an order header and all of its lines are created in one transaction
//! - an order line keeps the price read when its stock was decremented
//! - order status only moves forward (see [`order::OrderStatus`])

use std::future::Future;
use std::pin::Pin;

pub mod address;
pub mod cart;
pub mod environment;
pub mod error;
pub mod order;
pub mod payment;
pub mod sku;
pub mod store;
pub mod task;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub use error::{CartError, CommitError, OrderError, PaymentError, RejectReason, StoreError};
pub use order::{OrderHeader, OrderLine, OrderStatus, PayMethod};
pub use sku::Sku;
pub use types::{AddressId, CategoryId, GoodsId, Money, OrderId, SkuId, UserId};

/// Boxed future used by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
