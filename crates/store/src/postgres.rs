//! PostgreSQL-backed store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, FunnelId, WorkspaceId};
use sqlx::{PgPool, Row, postgres::PgRow};

use cart::{
    Cart, CartFulfillment, CartFunnel, CartStage, Fan, FunnelStore, Money, StoreError, StoreResult,
    Workspace,
};

/// PostgreSQL [`FunnelStore`].
///
/// Cross-handler coordination relies on conditional statements:
/// stage changes are `UPDATE ... WHERE stage = ANY(...)`, the receipt flag
/// is claimed with `UPDATE ... WHERE receipt_sent = FALSE`, and counter
/// writes are upsert-adds. No read-modify-write anywhere.
#[derive(Clone)]
pub struct PostgresFunnelStore {
    pool: PgPool,
}

impl PostgresFunnelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_cart(row: &PgRow) -> StoreResult<Cart> {
        let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
        let cart: Cart = serde_json::from_value(payload)?;
        Ok(cart)
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn duplicate_on_constraint(
    e: sqlx::Error,
    constraint: &str,
    kind: &'static str,
    id: String,
) -> StoreError {
    if let sqlx::Error::Database(ref db) = e
        && db.constraint() == Some(constraint)
    {
        return StoreError::Duplicate { kind, id };
    }
    db_err(e)
}

#[async_trait]
impl FunnelStore for PostgresFunnelStore {
    async fn insert_workspace(&self, workspace: Workspace) -> StoreResult<()> {
        let payload = serde_json::to_value(&workspace)?;
        sqlx::query("INSERT INTO workspaces (id, payload) VALUES ($1, $2)")
            .bind(workspace.id.as_uuid())
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                duplicate_on_constraint(e, "workspaces_pkey", "workspace", workspace.id.to_string())
            })?;
        Ok(())
    }

    async fn get_workspace(&self, id: WorkspaceId) -> StoreResult<Option<Workspace>> {
        let row = sqlx::query("SELECT payload FROM workspaces WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_funnel(&self, funnel: CartFunnel) -> StoreResult<()> {
        let payload = serde_json::to_value(&funnel)?;
        sqlx::query(
            "INSERT INTO funnels (id, workspace_id, handle, key, payload) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(funnel.id.as_uuid())
        .bind(funnel.workspace_id.as_uuid())
        .bind(&funnel.handle)
        .bind(&funnel.key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            duplicate_on_constraint(
                e,
                "unique_funnel_route",
                "funnel route",
                format!("{}/{}", funnel.handle, funnel.key),
            )
        })?;
        Ok(())
    }

    async fn get_funnel(&self, id: FunnelId) -> StoreResult<Option<CartFunnel>> {
        let row = sqlx::query("SELECT payload FROM funnels WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn get_funnel_by_key(&self, handle: &str, key: &str) -> StoreResult<Option<CartFunnel>> {
        let row = sqlx::query("SELECT payload FROM funnels WHERE handle = $1 AND key = $2")
            .bind(handle)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_cart(&self, cart: Cart) -> StoreResult<()> {
        let payload = serde_json::to_value(&cart)?;
        sqlx::query(
            "INSERT INTO carts \
             (id, workspace_id, stage, order_id, created_at, updated_at, payload) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(cart.id.as_uuid())
        .bind(cart.workspace_id.as_uuid())
        .bind(cart.stage.as_str())
        .bind(cart.order_id)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_on_constraint(e, "carts_pkey", "cart", cart.id.to_string()))?;
        Ok(())
    }

    async fn get_cart(&self, id: CartId) -> StoreResult<Option<Cart>> {
        let row = sqlx::query("SELECT payload FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_cart(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_cart_guarded(&self, cart: &Cart, expected: &[CartStage]) -> StoreResult<()> {
        let payload = serde_json::to_value(cart)?;
        let expected_names: Vec<String> =
            expected.iter().map(|s| s.as_str().to_string()).collect();

        let result = sqlx::query(
            "UPDATE carts \
             SET stage = $2, order_id = $3, updated_at = $4, payload = $5 \
             WHERE id = $1 AND stage = ANY($6)",
        )
        .bind(cart.id.as_uuid())
        .bind(cart.stage.as_str())
        .bind(cart.order_id)
        .bind(cart.updated_at)
        .bind(payload)
        .bind(&expected_names)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Distinguish a missing cart from a stage conflict.
        let current: Option<String> = sqlx::query_scalar("SELECT stage FROM carts WHERE id = $1")
            .bind(cart.id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match current.and_then(|s| CartStage::parse(&s)) {
            Some(actual) => Err(StoreError::StageConflict {
                cart_id: cart.id,
                actual,
            }),
            None => Err(StoreError::NotFound {
                kind: "cart",
                id: cart.id.to_string(),
            }),
        }
    }

    async fn claim_receipt(&self, cart_id: CartId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE carts SET receipt_sent = TRUE WHERE id = $1 AND receipt_sent = FALSE",
        )
        .bind(cart_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: Option<bool> =
            sqlx::query_scalar("SELECT receipt_sent FROM carts WHERE id = $1")
                .bind(cart_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                kind: "cart",
                id: cart_id.to_string(),
            }),
        }
    }

    async fn receipt_sent(&self, cart_id: CartId) -> StoreResult<bool> {
        let sent: Option<bool> = sqlx::query_scalar("SELECT receipt_sent FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(sent.unwrap_or(false))
    }

    async fn carts_in_stage_before(
        &self,
        stage: CartStage,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Cart>> {
        let rows = sqlx::query("SELECT payload FROM carts WHERE stage = $1 AND updated_at < $2")
            .bind(stage.as_str())
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(Self::row_to_cart).collect()
    }

    async fn find_fan_by_email(&self, email: &str) -> StoreResult<Option<Fan>> {
        let row = sqlx::query("SELECT payload FROM fans WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn find_fan_by_provider_customer(&self, customer_id: &str) -> StoreResult<Option<Fan>> {
        let row = sqlx::query("SELECT payload FROM fans WHERE provider_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_fan(&self, fan: Fan) -> StoreResult<()> {
        let payload = serde_json::to_value(&fan)?;
        sqlx::query(
            "INSERT INTO fans (id, email, provider_customer_id, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(fan.id.as_uuid())
        .bind(&fan.email)
        .bind(&fan.provider_customer_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_on_constraint(e, "unique_fan_email", "fan", fan.email.clone()))?;
        Ok(())
    }

    async fn count_orders(&self, workspace_id: WorkspaceId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM carts WHERE workspace_id = $1 AND order_id IS NOT NULL",
        )
        .bind(workspace_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn insert_fulfillment(&self, fulfillment: CartFulfillment) -> StoreResult<()> {
        let payload = serde_json::to_value(&fulfillment)?;
        sqlx::query("INSERT INTO fulfillments (id, cart_id, payload) VALUES ($1, $2, $3)")
            .bind(fulfillment.id.as_uuid())
            .bind(fulfillment.cart_id.as_uuid())
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn fulfillments_for_cart(&self, cart_id: CartId) -> StoreResult<Vec<CartFulfillment>> {
        let rows = sqlx::query("SELECT payload FROM fulfillments WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
                Ok(serde_json::from_value(payload)?)
            })
            .collect()
    }

    async fn add_asset_value(&self, asset_key: &str, delta: Money) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO asset_values (asset_key, value_cents) VALUES ($1, $2) \
             ON CONFLICT (asset_key) \
             DO UPDATE SET value_cents = asset_values.value_cents + EXCLUDED.value_cents",
        )
        .bind(asset_key)
        .bind(delta.cents())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn asset_value(&self, asset_key: &str) -> StoreResult<Money> {
        let cents: Option<i64> =
            sqlx::query_scalar("SELECT value_cents FROM asset_values WHERE asset_key = $1")
                .bind(asset_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(Money::from_cents(cents.unwrap_or(0)))
    }
}
