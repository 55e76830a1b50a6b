//! Deferred work recorded with the change that caused it.
//!
//! A task is written to the store's outbox inside the same transaction as
//! the order change, so it exists exactly when the change committed. A relay
//! drains the outbox and delivers each task at least once; handlers must
//! tolerate duplicates.

use crate::types::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// An order was durably committed (e.g. send a confirmation email).
    OrderPlaced {
        /// Order
        order_id: OrderId,
        /// Buyer
        user_id: UserId,
    },
    /// A gateway payment was confirmed.
    PaymentConfirmed {
        /// Order
        order_id: OrderId,
        /// Gateway trade number
        trade_no: String,
    },
}

impl Task {
    /// Short name for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "order_placed",
            Self::PaymentConfirmed { .. } => "payment_confirmed",
        }
    }
}

/// A task claimed from the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    /// Outbox row id
    pub id: i64,
    /// The work itself
    pub task: Task,
    /// Deliveries attempted so far, this one included
    pub attempts: u32,
}

/// Task handling failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The handler failed to process a task.
    #[error("task handler failed: {0}")]
    Handler(String),
}
