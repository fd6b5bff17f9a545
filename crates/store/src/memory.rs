//! In-memory store implementation for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, FanId, FunnelId, WorkspaceId};
use tokio::sync::RwLock;

use cart::{
    Cart, CartFulfillment, CartFunnel, CartStage, Fan, FunnelStore, Money, StoreError, StoreResult,
    Workspace,
};

#[derive(Default)]
struct Tables {
    workspaces: HashMap<WorkspaceId, Workspace>,
    funnels: HashMap<FunnelId, CartFunnel>,
    carts: HashMap<CartId, Cart>,
    /// Receipt claims; a cart id is present once its receipt is claimed.
    receipts: HashMap<CartId, bool>,
    fans: HashMap<FanId, Fan>,
    fulfillments: Vec<CartFulfillment>,
    asset_values: HashMap<String, i64>,
}

/// In-memory [`FunnelStore`] with the same conditional-update semantics as
/// the PostgreSQL implementation. Guarded updates and receipt claims run
/// under the write lock, so they behave as compare-and-swap.
#[derive(Clone, Default)]
pub struct InMemoryFunnelStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryFunnelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored carts.
    pub async fn cart_count(&self) -> usize {
        self.tables.read().await.carts.len()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        *tables = Tables::default();
    }
}

#[async_trait]
impl FunnelStore for InMemoryFunnelStore {
    async fn insert_workspace(&self, workspace: Workspace) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.workspaces.contains_key(&workspace.id) {
            return Err(StoreError::Duplicate {
                kind: "workspace",
                id: workspace.id.to_string(),
            });
        }
        tables.workspaces.insert(workspace.id, workspace);
        Ok(())
    }

    async fn get_workspace(&self, id: WorkspaceId) -> StoreResult<Option<Workspace>> {
        Ok(self.tables.read().await.workspaces.get(&id).cloned())
    }

    async fn insert_funnel(&self, funnel: CartFunnel) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.funnels.contains_key(&funnel.id) {
            return Err(StoreError::Duplicate {
                kind: "funnel",
                id: funnel.id.to_string(),
            });
        }
        if tables
            .funnels
            .values()
            .any(|f| f.handle == funnel.handle && f.key == funnel.key)
        {
            return Err(StoreError::Duplicate {
                kind: "funnel route",
                id: format!("{}/{}", funnel.handle, funnel.key),
            });
        }
        tables.funnels.insert(funnel.id, funnel);
        Ok(())
    }

    async fn get_funnel(&self, id: FunnelId) -> StoreResult<Option<CartFunnel>> {
        Ok(self.tables.read().await.funnels.get(&id).cloned())
    }

    async fn get_funnel_by_key(&self, handle: &str, key: &str) -> StoreResult<Option<CartFunnel>> {
        Ok(self
            .tables
            .read()
            .await
            .funnels
            .values()
            .find(|f| f.handle == handle && f.key == key)
            .cloned())
    }

    async fn insert_cart(&self, cart: Cart) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.carts.contains_key(&cart.id) {
            return Err(StoreError::Duplicate {
                kind: "cart",
                id: cart.id.to_string(),
            });
        }
        tables.carts.insert(cart.id, cart);
        Ok(())
    }

    async fn get_cart(&self, id: CartId) -> StoreResult<Option<Cart>> {
        Ok(self.tables.read().await.carts.get(&id).cloned())
    }

    async fn update_cart_guarded(&self, cart: &Cart, expected: &[CartStage]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let current = tables.carts.get(&cart.id).ok_or_else(|| StoreError::NotFound {
            kind: "cart",
            id: cart.id.to_string(),
        })?;

        // Stage must match the caller's expectation, and never regress.
        if !expected.contains(&current.stage) || cart.stage.rank() < current.stage.rank() {
            return Err(StoreError::StageConflict {
                cart_id: cart.id,
                actual: current.stage,
            });
        }

        tables.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn claim_receipt(&self, cart_id: CartId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.carts.contains_key(&cart_id) {
            return Err(StoreError::NotFound {
                kind: "cart",
                id: cart_id.to_string(),
            });
        }
        let claimed = tables.receipts.entry(cart_id).or_insert(false);
        if *claimed {
            Ok(false)
        } else {
            *claimed = true;
            Ok(true)
        }
    }

    async fn receipt_sent(&self, cart_id: CartId) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .receipts
            .get(&cart_id)
            .copied()
            .unwrap_or(false))
    }

    async fn carts_in_stage_before(
        &self,
        stage: CartStage,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Cart>> {
        Ok(self
            .tables
            .read()
            .await
            .carts
            .values()
            .filter(|c| c.stage == stage && c.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn find_fan_by_email(&self, email: &str) -> StoreResult<Option<Fan>> {
        Ok(self
            .tables
            .read()
            .await
            .fans
            .values()
            .find(|f| f.email == email)
            .cloned())
    }

    async fn find_fan_by_provider_customer(&self, customer_id: &str) -> StoreResult<Option<Fan>> {
        Ok(self
            .tables
            .read()
            .await
            .fans
            .values()
            .find(|f| f.provider_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn insert_fan(&self, fan: Fan) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.fans.values().any(|f| f.email == fan.email) {
            return Err(StoreError::Duplicate {
                kind: "fan",
                id: fan.email.clone(),
            });
        }
        tables.fans.insert(fan.id, fan);
        Ok(())
    }

    async fn count_orders(&self, workspace_id: WorkspaceId) -> StoreResult<u64> {
        Ok(self
            .tables
            .read()
            .await
            .carts
            .values()
            .filter(|c| c.workspace_id == workspace_id && c.order_id.is_some())
            .count() as u64)
    }

    async fn insert_fulfillment(&self, fulfillment: CartFulfillment) -> StoreResult<()> {
        self.tables.write().await.fulfillments.push(fulfillment);
        Ok(())
    }

    async fn fulfillments_for_cart(&self, cart_id: CartId) -> StoreResult<Vec<CartFulfillment>> {
        Ok(self
            .tables
            .read()
            .await
            .fulfillments
            .iter()
            .filter(|f| f.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn add_asset_value(&self, asset_key: &str, delta: Money) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        *tables.asset_values.entry(asset_key.to_string()).or_insert(0) += delta.cents();
        Ok(())
    }

    async fn asset_value(&self, asset_key: &str) -> StoreResult<Money> {
        Ok(Money::from_cents(
            self.tables
                .read()
                .await
                .asset_values
                .get(asset_key)
                .copied()
                .unwrap_or(0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cart::{CheckoutDraft, Product};
    use common::VisitorContext;

    fn funnel() -> CartFunnel {
        CartFunnel {
            id: FunnelId::new(),
            workspace_id: WorkspaceId::new(),
            handle: "acme".to_string(),
            key: "launch".to_string(),
            main_product: Product::new("SKU-MAIN", "Album", Money::from_cents(2000)),
            main_pay_what_you_want: None,
            bump_product: None,
            bump_price_override: None,
            upsell_product: None,
            upsell_price_override: None,
            handling_fee: Money::zero(),
            fee_percent_override: None,
        }
    }

    async fn stored_cart(store: &InMemoryFunnelStore) -> Cart {
        let cart = Cart::create(
            &funnel(),
            VisitorContext::default(),
            CheckoutDraft::default(),
        )
        .unwrap();
        store.insert_cart(cart.clone()).await.unwrap();
        cart
    }

    #[tokio::test]
    async fn cart_round_trip() {
        let store = InMemoryFunnelStore::new();
        let cart = stored_cart(&store).await;

        let loaded = store.get_cart(cart.id).await.unwrap().unwrap();
        assert_eq!(loaded, cart);
    }

    #[tokio::test]
    async fn duplicate_cart_id_rejected() {
        let store = InMemoryFunnelStore::new();
        let cart = stored_cart(&store).await;
        let result = store.insert_cart(cart).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn guarded_update_rejects_unexpected_stage() {
        let store = InMemoryFunnelStore::new();
        let mut cart = stored_cart(&store).await;

        cart.convert_checkout(false).unwrap();
        store
            .update_cart_guarded(&cart, &[CartStage::CheckoutCreated])
            .await
            .unwrap();

        // A stale writer still expecting the pre-conversion stage loses.
        let mut stale = cart.clone();
        stale.email = Some("late@example.com".to_string());
        let result = store
            .update_cart_guarded(&stale, &[CartStage::CheckoutCreated])
            .await;
        assert!(matches!(result, Err(StoreError::StageConflict { .. })));
    }

    #[tokio::test]
    async fn guarded_update_rejects_stage_regression() {
        let store = InMemoryFunnelStore::new();
        let mut cart = stored_cart(&store).await;

        cart.convert_checkout(false).unwrap();
        store
            .update_cart_guarded(&cart, &[CartStage::CheckoutCreated])
            .await
            .unwrap();

        let mut regressed = cart.clone();
        regressed.stage = CartStage::CheckoutCreated;
        let result = store
            .update_cart_guarded(&regressed, &[CartStage::CheckoutConverted])
            .await;
        assert!(matches!(result, Err(StoreError::StageConflict { .. })));
    }

    #[tokio::test]
    async fn receipt_claimed_exactly_once() {
        let store = InMemoryFunnelStore::new();
        let cart = stored_cart(&store).await;

        assert!(store.claim_receipt(cart.id).await.unwrap());
        assert!(!store.claim_receipt(cart.id).await.unwrap());
        assert!(store.receipt_sent(cart.id).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_receipt_claims_have_one_winner() {
        let store = InMemoryFunnelStore::new();
        let cart = stored_cart(&store).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = cart.id;
            handles.push(tokio::spawn(
                async move { store.claim_receipt(id).await.unwrap() },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn asset_value_adds_are_cumulative() {
        let store = InMemoryFunnelStore::new();
        store
            .add_asset_value("ad:1", Money::from_cents(2000))
            .await
            .unwrap();
        store
            .add_asset_value("ad:1", Money::from_cents(500))
            .await
            .unwrap();
        assert_eq!(
            store.asset_value("ad:1").await.unwrap(),
            Money::from_cents(2500)
        );
        assert_eq!(store.asset_value("ad:2").await.unwrap(), Money::zero());
    }

    #[tokio::test]
    async fn count_orders_counts_only_numbered_carts() {
        let store = InMemoryFunnelStore::new();
        let workspace_id = WorkspaceId::new();

        let f = funnel();
        for order_id in [None, Some(1), Some(2)] {
            let mut cart = Cart::create(
                &f,
                VisitorContext::default(),
                CheckoutDraft::default(),
            )
            .unwrap();
            cart.workspace_id = workspace_id;
            cart.order_id = order_id;
            store.insert_cart(cart).await.unwrap();
        }

        assert_eq!(store.count_orders(workspace_id).await.unwrap(), 2);
        assert_eq!(store.count_orders(WorkspaceId::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fan_email_is_unique() {
        let store = InMemoryFunnelStore::new();
        store
            .insert_fan(Fan::from_email("jane@example.com"))
            .await
            .unwrap();
        let result = store.insert_fan(Fan::from_email("jane@example.com")).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn funnel_lookup_by_route() {
        let store = InMemoryFunnelStore::new();
        let f = funnel();
        store.insert_funnel(f.clone()).await.unwrap();

        let found = store.get_funnel_by_key("acme", "launch").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(f.id));
        assert!(
            store
                .get_funnel_by_key("acme", "other")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn sweep_query_filters_by_stage_and_age() {
        let store = InMemoryFunnelStore::new();
        let mut cart = stored_cart(&store).await;
        cart.convert_checkout(true).unwrap();
        store
            .update_cart_guarded(&cart, &[CartStage::CheckoutCreated])
            .await
            .unwrap();

        let future = Utc::now() + chrono::Duration::minutes(5);
        let due = store
            .carts_in_stage_before(CartStage::UpsellCreated, future)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);

        let past = Utc::now() - chrono::Duration::minutes(5);
        let none = store
            .carts_in_stage_before(CartStage::UpsellCreated, past)
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
