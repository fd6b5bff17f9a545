//! HTTP route handlers.

pub mod carts;
pub mod events;
pub mod health;
pub mod metrics;
pub mod webhooks;
