//! Funnel configuration: the seller-facing sales page definition.

use common::{FunnelId, WorkspaceId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A sellable product as referenced by a funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Merchant SKU.
    pub id: String,
    pub name: String,
    /// List price per unit.
    pub price: Money,
    /// Whether the product needs an apparel size at purchase time.
    #[serde(default)]
    pub is_apparel: bool,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            is_apparel: false,
        }
    }
}

/// Pay-what-you-want pricing bounds for the main product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayWhatYouWant {
    /// Floor the buyer-chosen price must meet.
    pub min: Money,
}

/// A seller-configured sales page: main product, optional order bump and
/// optional post-purchase upsell, with per-funnel pricing overrides.
///
/// Read-mostly; immutable during a cart's lifetime except by seller edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartFunnel {
    pub id: FunnelId,
    pub workspace_id: WorkspaceId,
    /// Tenant-scoped route: `/{handle}/{key}`.
    pub handle: String,
    pub key: String,

    pub main_product: Product,
    /// When set, the buyer chooses the main price above the floor.
    pub main_pay_what_you_want: Option<PayWhatYouWant>,

    pub bump_product: Option<Product>,
    /// Discounted bump price; falls back to the product list price.
    pub bump_price_override: Option<Money>,

    pub upsell_product: Option<Product>,
    /// Discounted upsell price; falls back to the product list price.
    pub upsell_price_override: Option<Money>,

    /// Flat handling fee added to the shipping line.
    #[serde(default)]
    pub handling_fee: Money,

    /// Per-funnel platform fee override (fraction, e.g. `0.05`).
    pub fee_percent_override: Option<f64>,
}

impl CartFunnel {
    pub fn has_upsell(&self) -> bool {
        self.upsell_product.is_some()
    }

    /// Effective bump price when a bump product is configured.
    pub fn bump_price(&self) -> Option<Money> {
        self.bump_product
            .as_ref()
            .map(|p| self.bump_price_override.unwrap_or(p.price))
    }

    /// Effective upsell price when an upsell product is configured.
    pub fn upsell_price(&self) -> Option<Money> {
        self.upsell_product
            .as_ref()
            .map(|p| self.upsell_price_override.unwrap_or(p.price))
    }
}
