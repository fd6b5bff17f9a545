//! Persistence trait for funnel state.
//!
//! All coordination between concurrent handlers goes through the persisted
//! cart row: stage changes are conditional updates (compare-and-swap on the
//! expected stage set), the receipt flag is claimed atomically, and counter
//! writes are atomic adds. Implementations must uphold those semantics; the
//! in-memory store serializes through a write lock, the Postgres store
//! through conditional `UPDATE`s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, FunnelId, WorkspaceId};
use thiserror::Error;

use crate::cart::Cart;
use crate::fan::Fan;
use crate::fulfillment::CartFulfillment;
use crate::funnel::CartFunnel;
use crate::money::Money;
use crate::stage::CartStage;
use crate::workspace::Workspace;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A guarded cart update found a stage outside the expected set.
    #[error("stage conflict for cart {cart_id}: stage is {actual}")]
    StageConflict { cart_id: CartId, actual: CartStage },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage for workspaces, funnels, carts, fans, fulfillments and the
/// attribution counters.
#[async_trait]
pub trait FunnelStore: Send + Sync {
    async fn insert_workspace(&self, workspace: Workspace) -> StoreResult<()>;
    async fn get_workspace(&self, id: WorkspaceId) -> StoreResult<Option<Workspace>>;

    async fn insert_funnel(&self, funnel: CartFunnel) -> StoreResult<()>;
    async fn get_funnel(&self, id: FunnelId) -> StoreResult<Option<CartFunnel>>;
    /// Looks up a funnel by its tenant-scoped route.
    async fn get_funnel_by_key(&self, handle: &str, key: &str) -> StoreResult<Option<CartFunnel>>;

    async fn insert_cart(&self, cart: Cart) -> StoreResult<()>;
    async fn get_cart(&self, id: CartId) -> StoreResult<Option<Cart>>;

    /// Persists `cart` only while the stored stage is in `expected`;
    /// `StageConflict` otherwise. The receipt flag is NOT written by this
    /// method — [`FunnelStore::claim_receipt`] is its only writer.
    async fn update_cart_guarded(&self, cart: &Cart, expected: &[CartStage]) -> StoreResult<()>;

    /// Atomically claims the cart's receipt send. Returns true for the one
    /// caller that gets to send the email, false once claimed.
    async fn claim_receipt(&self, cart_id: CartId) -> StoreResult<bool>;

    async fn receipt_sent(&self, cart_id: CartId) -> StoreResult<bool>;

    /// Carts sitting in `stage` since before `cutoff`, for the sweep.
    async fn carts_in_stage_before(
        &self,
        stage: CartStage,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Cart>>;

    async fn find_fan_by_email(&self, email: &str) -> StoreResult<Option<Fan>>;
    async fn find_fan_by_provider_customer(&self, customer_id: &str) -> StoreResult<Option<Fan>>;
    async fn insert_fan(&self, fan: Fan) -> StoreResult<()>;

    /// Number of converted orders for a workspace; the next order id is
    /// derived from this at the time of first need.
    async fn count_orders(&self, workspace_id: WorkspaceId) -> StoreResult<u64>;

    async fn insert_fulfillment(&self, fulfillment: CartFulfillment) -> StoreResult<()>;
    async fn fulfillments_for_cart(&self, cart_id: CartId) -> StoreResult<Vec<CartFulfillment>>;

    /// Atomic add to a value-attribution counter, keyed by asset
    /// (e.g. `"ad:1234"`). Never read-modify-write.
    async fn add_asset_value(&self, asset_key: &str, delta: Money) -> StoreResult<()>;
    async fn asset_value(&self, asset_key: &str) -> StoreResult<Money>;
}
