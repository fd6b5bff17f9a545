//! Analytics event schema.
//!
//! Events are write-once: built at record time, shipped to the warehouse
//! and the ad sink, never updated or deleted.

use chrono::{DateTime, Utc};
use common::{CartId, SessionId, WorkspaceId};
use serde::{Deserialize, Serialize};

use cart::Money;

/// What kind of asset an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Link,
    Bio,
    Fm,
    LandingPage,
    CartFunnel,
    VipGate,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Link => "link",
            AssetKind::Bio => "bio",
            AssetKind::Fm => "fm",
            AssetKind::LandingPage => "page",
            AssetKind::CartFunnel => "cart",
            AssetKind::VipGate => "vip",
        }
    }
}

/// The asset an event is recorded against, with an optional sub-entity
/// (e.g. a specific link inside a bio page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub id: String,
    pub sub_id: Option<String>,
}

impl AssetRef {
    pub fn new(kind: AssetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            sub_id: None,
        }
    }

    pub fn with_sub(kind: AssetKind, id: impl Into<String>, sub_id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            sub_id: Some(sub_id.into()),
        }
    }

    /// Counter and dedup key: `kind:id[:sub_id]`.
    pub fn key(&self) -> String {
        match &self.sub_id {
            Some(sub) => format!("{}:{}:{}", self.kind.as_str(), self.id, sub),
            None => format!("{}:{}", self.kind.as_str(), self.id),
        }
    }
}

/// Internal event types recorded by product surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    PageView,
    LinkClick,
    BioView,
    FmView,
    VipUnlock,
    CartCheckoutStarted,
    CartPurchase,
    CartUpsellPurchase,
    CartUpsellDeclined,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "pageView",
            EventType::LinkClick => "linkClick",
            EventType::BioView => "bioView",
            EventType::FmView => "fmView",
            EventType::VipUnlock => "vipUnlock",
            EventType::CartCheckoutStarted => "cartCheckoutStarted",
            EventType::CartPurchase => "cartPurchase",
            EventType::CartUpsellPurchase => "cartUpsellPurchase",
            EventType::CartUpsellDeclined => "cartUpsellDeclined",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monetary payload attached to cart purchase events: the cart's breakdown
/// at the moment of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseData {
    pub cart_id: CartId,
    pub order_id: Option<i64>,
    pub product_amount: Money,
    pub shipping_and_handling_amount: Money,
    pub vat_amount: Money,
    pub amount: Money,
}

/// The flattened, append-only warehouse row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub timestamp: DateTime<Utc>,
    pub workspace_id: WorkspaceId,
    pub asset_kind: AssetKind,
    pub asset_id: String,
    pub asset_sub_id: Option<String>,
    pub asset_key: String,
    pub session_id: Option<SessionId>,
    pub event_type: EventType,

    // Flattened visitor fields.
    pub ip: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub referrer: Option<String>,
    pub click_id: Option<String>,

    pub purchase: Option<PurchaseData>,
}
