//! Shipment records attached to a cart.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{CartId, FulfillmentId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// One shipment covering a subset of a cart's purchased products.
///
/// Append-only: a cart accumulates fulfillments and never edits or deletes
/// them. Completeness is always derived (see [`is_fully_fulfilled`]), never
/// stored as a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartFulfillment {
    pub id: FulfillmentId,
    pub cart_id: CartId,
    /// Product ids this shipment covers.
    pub product_ids: Vec<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    /// What the label actually cost.
    pub label_cost: Money,
    /// The slice of buyer-paid shipping allocated to this shipment.
    pub shipping_collected: Money,
    pub created_at: DateTime<Utc>,
}

impl CartFulfillment {
    pub fn new(cart_id: CartId, product_ids: Vec<String>) -> Self {
        Self {
            id: FulfillmentId::new(),
            cart_id,
            product_ids,
            carrier: None,
            tracking_number: None,
            label_cost: Money::zero(),
            shipping_collected: Money::zero(),
            created_at: Utc::now(),
        }
    }

    /// Label cost minus what the buyer paid, for margin monitoring.
    /// Positive means the label cost more than was collected.
    pub fn cost_delta(&self) -> Money {
        self.label_cost - self.shipping_collected
    }
}

/// Derives full fulfillment by set-covering the purchased product ids with
/// the union of fulfilled ids across all shipments.
pub fn is_fully_fulfilled(purchased: &[String], fulfillments: &[CartFulfillment]) -> bool {
    if purchased.is_empty() {
        return false;
    }
    let fulfilled: HashSet<&str> = fulfillments
        .iter()
        .flat_map(|f| f.product_ids.iter().map(String::as_str))
        .collect();
    purchased.iter().all(|id| fulfilled.contains(id.as_str()))
}
