//! HTTP request handlers, organized by domain.

pub mod cart;
pub mod health;
pub mod orders;
pub mod payment;

pub use health::health_check;
