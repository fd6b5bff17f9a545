//! The cart aggregate: one checkout attempt through a funnel.

use chrono::{DateTime, Utc};
use common::{CartId, FanId, FunnelId, VisitorContext, WorkspaceId};
use serde::{Deserialize, Serialize};

use crate::error::CartError;
use crate::funnel::CartFunnel;
use crate::money::Money;
use crate::stage::CartStage;

/// Shipping destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
}

/// VAT fraction for a ship-to country. Unknown countries carry no VAT.
pub fn vat_rate(country: Option<&str>) -> f64 {
    match country {
        Some("GB") => 0.20,
        Some("DE") => 0.19,
        Some("FR") => 0.20,
        Some("IT") => 0.22,
        Some("ES") => 0.21,
        _ => 0.0,
    }
}

/// A purchased line with its locked-in quantity and price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub apparel_size: Option<String>,
}

impl CartLine {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            apparel_size: None,
        }
    }

    pub fn total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Client-supplied fields when opening a checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutDraft {
    pub email: Option<String>,
    pub ship_to: Option<Address>,
    /// Buyer-chosen price for pay-what-you-want funnels.
    pub chosen_price: Option<Money>,
    #[serde(default)]
    pub bump_selected: bool,
    pub quantity: Option<u32>,
}

/// Client-submitted checkout edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutPatch {
    pub email: Option<String>,
    pub ship_to: Option<Address>,
    pub chosen_price: Option<Money>,
    pub bump_selected: Option<bool>,
    pub quantity: Option<u32>,
}

/// One checkout attempt. Owned exclusively by the funnel engine; every
/// mutation goes through a transition method that validates the stage, and
/// every write back to storage is conditional on the expected stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub funnel_id: FunnelId,
    pub workspace_id: WorkspaceId,
    pub stage: CartStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// First-touch visitor/attribution snapshot.
    pub visitor: VisitorContext,
    pub email: Option<String>,
    pub ship_to: Option<Address>,
    /// Postal code the current shipping amount was estimated for.
    pub estimated_postal_code: Option<String>,

    pub main: CartLine,
    pub bump: Option<CartLine>,
    pub upsell: Option<CartLine>,

    // Checkout breakdown (main + bump).
    pub checkout_product_amount: Money,
    pub checkout_shipping_amount: Money,
    pub checkout_handling_amount: Money,
    pub checkout_vat_amount: Money,
    pub checkout_amount: Money,

    // Upsell breakdown, populated at upsell conversion.
    pub upsell_product_amount: Money,
    pub upsell_shipping_amount: Money,
    pub upsell_vat_amount: Money,
    pub upsell_amount: Money,

    // Order aggregates; updated by addition, never recomputed from scratch.
    pub order_product_amount: Money,
    pub order_shipping_and_handling_amount: Money,
    pub order_vat_amount: Money,
    pub order_amount: Money,

    // Payment provider references.
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub provider_customer_id: Option<String>,
    pub upsell_charge_id: Option<String>,

    pub fan_id: Option<FanId>,
    /// Per-workspace order number, assigned at first conversion.
    pub order_id: Option<i64>,

    pub canceled_at: Option<DateTime<Utc>>,
    pub refunded_amount: Money,
    /// Set when a shipping estimate failed and the cart proceeded with
    /// zero shipping, pending manual reconciliation.
    #[serde(default)]
    pub shipping_unresolved: bool,
}

impl Cart {
    /// Opens a checkout attempt against a funnel.
    ///
    /// Shipping starts at zero; the engine estimates and sets it when a
    /// ship-to locality is known, then the intent is sized to the result.
    pub fn create(
        funnel: &CartFunnel,
        visitor: VisitorContext,
        draft: CheckoutDraft,
    ) -> Result<Cart, CartError> {
        let quantity = draft.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(CartError::Validation("quantity must be at least 1".into()));
        }

        let unit_price = match (&funnel.main_pay_what_you_want, draft.chosen_price) {
            (Some(pwyw), Some(chosen)) => {
                if chosen < pwyw.min {
                    return Err(CartError::Validation(format!(
                        "chosen price {chosen} is below the minimum {}",
                        pwyw.min
                    )));
                }
                chosen
            }
            (Some(pwyw), None) => pwyw.min,
            (None, _) => funnel.main_product.price,
        };

        let main = CartLine::new(
            funnel.main_product.id.clone(),
            funnel.main_product.name.clone(),
            quantity,
            unit_price,
        );

        let bump = if draft.bump_selected {
            funnel.bump_product.as_ref().map(|p| {
                CartLine::new(
                    p.id.clone(),
                    p.name.clone(),
                    1,
                    funnel.bump_price().unwrap_or(p.price),
                )
            })
        } else {
            None
        };

        let now = Utc::now();
        let mut cart = Cart {
            id: CartId::new(),
            funnel_id: funnel.id,
            workspace_id: funnel.workspace_id,
            stage: CartStage::CheckoutCreated,
            created_at: now,
            updated_at: now,
            visitor,
            email: draft.email,
            ship_to: draft.ship_to,
            estimated_postal_code: None,
            main,
            bump,
            upsell: None,
            checkout_product_amount: Money::zero(),
            checkout_shipping_amount: Money::zero(),
            checkout_handling_amount: funnel.handling_fee,
            checkout_vat_amount: Money::zero(),
            checkout_amount: Money::zero(),
            upsell_product_amount: Money::zero(),
            upsell_shipping_amount: Money::zero(),
            upsell_vat_amount: Money::zero(),
            upsell_amount: Money::zero(),
            order_product_amount: Money::zero(),
            order_shipping_and_handling_amount: Money::zero(),
            order_vat_amount: Money::zero(),
            order_amount: Money::zero(),
            payment_intent_id: None,
            charge_id: None,
            payment_method_id: None,
            provider_customer_id: None,
            upsell_charge_id: None,
            fan_id: None,
            order_id: None,
            canceled_at: None,
            refunded_amount: Money::zero(),
            shipping_unresolved: false,
        };
        cart.recompute_checkout_amounts();
        Ok(cart)
    }

    /// Shipping plus handling for the checkout step.
    pub fn checkout_shipping_and_handling(&self) -> Money {
        self.checkout_shipping_amount + self.checkout_handling_amount
    }

    /// Recomputes the checkout breakdown from the current lines.
    ///
    /// Keeps the invariant
    /// `checkout_amount == product + shipping&handling + vat`.
    pub fn recompute_checkout_amounts(&mut self) {
        self.checkout_product_amount =
            self.main.total() + self.bump.as_ref().map(CartLine::total).unwrap_or_default();
        let rate = vat_rate(self.ship_to.as_ref().map(|a| a.country.as_str()));
        self.checkout_vat_amount = self.checkout_product_amount.percentage(rate);
        self.checkout_amount = self.checkout_product_amount
            + self.checkout_shipping_and_handling()
            + self.checkout_vat_amount;
    }

    /// Sets the estimated shipping for the checkout step and recomputes.
    pub fn set_checkout_shipping(&mut self, shipping: Money, postal_code: Option<String>) {
        self.checkout_shipping_amount = shipping;
        self.estimated_postal_code = postal_code;
        self.shipping_unresolved = false;
        self.recompute_checkout_amounts();
    }

    /// Marks the shipping estimate as failed; checkout proceeds unblocked
    /// with zero shipping and the cart is flagged for manual reconciliation.
    pub fn mark_shipping_unresolved(&mut self) {
        self.checkout_shipping_amount = Money::zero();
        self.shipping_unresolved = true;
        self.recompute_checkout_amounts();
    }

    /// Applies a client-submitted edit while the checkout is still open.
    ///
    /// Returns true when the postal code changed and shipping needs a fresh
    /// estimate.
    pub fn apply_client_patch(
        &mut self,
        funnel: &CartFunnel,
        patch: CheckoutPatch,
    ) -> Result<bool, CartError> {
        if !self.stage.can_update_checkout() {
            return Err(CartError::InvalidStageTransition {
                stage: self.stage,
                action: "update checkout",
            });
        }

        if let Some(quantity) = patch.quantity {
            if quantity == 0 {
                return Err(CartError::Validation("quantity must be at least 1".into()));
            }
            self.main.quantity = quantity;
        }

        if let Some(chosen) = patch.chosen_price {
            match &funnel.main_pay_what_you_want {
                Some(pwyw) if chosen < pwyw.min => {
                    return Err(CartError::Validation(format!(
                        "chosen price {chosen} is below the minimum {}",
                        pwyw.min
                    )));
                }
                Some(_) => self.main.unit_price = chosen,
                None => {}
            }
        }

        if let Some(email) = patch.email {
            self.email = Some(email);
        }

        if let Some(selected) = patch.bump_selected {
            self.bump = if selected {
                funnel.bump_product.as_ref().map(|p| {
                    CartLine::new(
                        p.id.clone(),
                        p.name.clone(),
                        1,
                        funnel.bump_price().unwrap_or(p.price),
                    )
                })
            } else {
                None
            };
        }

        let mut postal_changed = false;
        if let Some(ship_to) = patch.ship_to {
            postal_changed = self.estimated_postal_code.as_deref() != Some(&ship_to.postal_code);
            self.ship_to = Some(ship_to);
        }

        self.recompute_checkout_amounts();
        self.touch();
        Ok(postal_changed)
    }

    /// Advances the cart past the main charge.
    ///
    /// Moves to `upsellCreated` when the funnel has an upsell product,
    /// `checkoutConverted` otherwise, and freezes the checkout breakdown
    /// into the order aggregates.
    pub fn convert_checkout(&mut self, has_upsell: bool) -> Result<(), CartError> {
        if !self.stage.can_convert_checkout() {
            return Err(CartError::InvalidStageTransition {
                stage: self.stage,
                action: "convert checkout",
            });
        }

        self.order_product_amount = self.checkout_product_amount;
        self.order_shipping_and_handling_amount = self.checkout_shipping_and_handling();
        self.order_vat_amount = self.checkout_vat_amount;
        self.order_amount = self.checkout_amount;
        self.stage = if has_upsell {
            CartStage::UpsellCreated
        } else {
            CartStage::CheckoutConverted
        };
        self.touch();
        Ok(())
    }

    /// Records a confirmed upsell purchase.
    ///
    /// Order totals are updated by addition only, so a partially failed
    /// upsell never perturbs the already-captured main order.
    pub fn convert_upsell(
        &mut self,
        line: CartLine,
        shipping: Money,
        vat: Money,
    ) -> Result<(), CartError> {
        if !self.stage.can_resolve_upsell() {
            return Err(CartError::InvalidStageTransition {
                stage: self.stage,
                action: "buy upsell",
            });
        }

        self.upsell_product_amount = line.total();
        self.upsell_shipping_amount = shipping;
        self.upsell_vat_amount = vat;
        self.upsell_amount = self.upsell_product_amount + shipping + vat;
        self.upsell = Some(line);

        self.order_product_amount += self.upsell_product_amount;
        self.order_shipping_and_handling_amount += shipping;
        self.order_vat_amount += vat;
        self.order_amount += self.upsell_amount;

        self.stage = CartStage::UpsellConverted;
        self.touch();
        Ok(())
    }

    pub fn decline_upsell(&mut self) -> Result<(), CartError> {
        if !self.stage.can_resolve_upsell() {
            return Err(CartError::InvalidStageTransition {
                stage: self.stage,
                action: "decline upsell",
            });
        }
        self.stage = CartStage::UpsellDeclined;
        self.touch();
        Ok(())
    }

    pub fn mark_upsell_abandoned(&mut self) -> Result<(), CartError> {
        if !self.stage.can_resolve_upsell() {
            return Err(CartError::InvalidStageTransition {
                stage: self.stage,
                action: "abandon upsell",
            });
        }
        self.stage = CartStage::UpsellAbandoned;
        self.touch();
        Ok(())
    }

    pub fn mark_checkout_abandoned(&mut self) -> Result<(), CartError> {
        if self.stage != CartStage::CheckoutCreated {
            return Err(CartError::InvalidStageTransition {
                stage: self.stage,
                action: "abandon checkout",
            });
        }
        self.stage = CartStage::CheckoutAbandoned;
        self.touch();
        Ok(())
    }

    /// Marks the cart canceled after refunds have been issued.
    pub fn mark_canceled(&mut self, refunded: Money) -> Result<(), CartError> {
        if !self.stage.is_converted() {
            return Err(CartError::InvalidStageTransition {
                stage: self.stage,
                action: "cancel",
            });
        }
        self.canceled_at = Some(Utc::now());
        self.refunded_amount = refunded;
        self.touch();
        Ok(())
    }

    /// Product ids the buyer paid for, used for fulfillment set covering.
    pub fn purchased_product_ids(&self) -> Vec<String> {
        let mut ids = vec![self.main.product_id.clone()];
        if let Some(bump) = &self.bump {
            ids.push(bump.product_id.clone());
        }
        if let Some(upsell) = &self.upsell {
            ids.push(upsell.product_id.clone());
        }
        ids
    }

    /// The amount-consistency invariant for the checkout breakdown.
    pub fn amounts_consistent(&self) -> bool {
        self.checkout_amount
            == self.checkout_product_amount
                + self.checkout_shipping_and_handling()
                + self.checkout_vat_amount
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
