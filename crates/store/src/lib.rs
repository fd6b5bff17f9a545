//! Store implementations for the funnel core.
//!
//! Two implementations of [`cart::FunnelStore`]:
//! - [`InMemoryFunnelStore`] for tests and local development
//! - [`PostgresFunnelStore`] backed by sqlx, where the conditional-update
//!   semantics map to guarded `UPDATE`s and upsert-adds

pub mod memory;
pub mod postgres;

pub use memory::InMemoryFunnelStore;
pub use postgres::PostgresFunnelStore;
