//! Cart stage state machine.

use serde::{Deserialize, Serialize};

/// The stage of a cart in its checkout lifecycle.
///
/// Stage transitions:
/// ```text
/// checkoutCreated ──► checkoutAbandoned ─┐
///        │                               │
///        └───────────────────────────────┴──► checkoutConverted
///                                                   │ (funnel has upsell)
///                                                   ▼
///                                             upsellCreated ──► upsellConverted
///                                                   │
///                                                   ├──► upsellDeclined
///                                                   └──► upsellAbandoned
/// ```
///
/// `checkoutAbandoned` is a side branch: an abandoned cart can still convert.
/// `checkoutConverted` is terminal only for funnels without an upsell product.
/// Stages never regress; the store enforces this with conditional updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CartStage {
    /// Checkout page opened, payment intent created.
    #[default]
    CheckoutCreated,

    /// Flagged abandoned pre-payment; conversion is still possible.
    CheckoutAbandoned,

    /// Main charge confirmed; terminal when the funnel has no upsell.
    CheckoutConverted,

    /// Main charge confirmed and the upsell offer is showing.
    UpsellCreated,

    /// Upsell purchased (terminal).
    UpsellConverted,

    /// Upsell offer timed out (terminal).
    UpsellAbandoned,

    /// Upsell explicitly declined (terminal).
    UpsellDeclined,
}

impl CartStage {
    /// Returns true while client-submitted checkout edits are accepted.
    pub fn can_update_checkout(&self) -> bool {
        matches!(
            self,
            CartStage::CheckoutCreated | CartStage::CheckoutAbandoned
        )
    }

    /// Returns true if the main charge can still be reconciled in this stage.
    pub fn can_convert_checkout(&self) -> bool {
        matches!(
            self,
            CartStage::CheckoutCreated | CartStage::CheckoutAbandoned
        )
    }

    /// Returns true while the upsell offer can be bought, declined or abandoned.
    pub fn can_resolve_upsell(&self) -> bool {
        matches!(self, CartStage::UpsellCreated)
    }

    /// Returns true once the main charge has been captured.
    pub fn is_converted(&self) -> bool {
        !matches!(
            self,
            CartStage::CheckoutCreated | CartStage::CheckoutAbandoned
        )
    }

    /// Returns true for stages with no further transitions on any funnel.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CartStage::UpsellConverted | CartStage::UpsellAbandoned | CartStage::UpsellDeclined
        )
    }

    /// Monotone ordering rank. Transitions never decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            CartStage::CheckoutCreated => 0,
            CartStage::CheckoutAbandoned => 1,
            CartStage::CheckoutConverted => 2,
            CartStage::UpsellCreated => 3,
            CartStage::UpsellConverted
            | CartStage::UpsellAbandoned
            | CartStage::UpsellDeclined => 4,
        }
    }

    /// Returns the stage name as used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStage::CheckoutCreated => "checkoutCreated",
            CartStage::CheckoutAbandoned => "checkoutAbandoned",
            CartStage::CheckoutConverted => "checkoutConverted",
            CartStage::UpsellCreated => "upsellCreated",
            CartStage::UpsellConverted => "upsellConverted",
            CartStage::UpsellAbandoned => "upsellAbandoned",
            CartStage::UpsellDeclined => "upsellDeclined",
        }
    }

    /// Parses a stored stage name.
    pub fn parse(s: &str) -> Option<CartStage> {
        match s {
            "checkoutCreated" => Some(CartStage::CheckoutCreated),
            "checkoutAbandoned" => Some(CartStage::CheckoutAbandoned),
            "checkoutConverted" => Some(CartStage::CheckoutConverted),
            "upsellCreated" => Some(CartStage::UpsellCreated),
            "upsellConverted" => Some(CartStage::UpsellConverted),
            "upsellAbandoned" => Some(CartStage::UpsellAbandoned),
            "upsellDeclined" => Some(CartStage::UpsellDeclined),
            _ => None,
        }
    }
}

impl std::fmt::Display for CartStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stage_is_checkout_created() {
        assert_eq!(CartStage::default(), CartStage::CheckoutCreated);
    }

    #[test]
    fn abandoned_checkout_can_still_convert() {
        assert!(CartStage::CheckoutAbandoned.can_convert_checkout());
        assert!(CartStage::CheckoutAbandoned.can_update_checkout());
    }

    #[test]
    fn converted_stages_reject_client_updates() {
        assert!(!CartStage::CheckoutConverted.can_update_checkout());
        assert!(!CartStage::UpsellCreated.can_update_checkout());
        assert!(!CartStage::UpsellConverted.can_update_checkout());
    }

    #[test]
    fn only_upsell_created_can_resolve_upsell() {
        for stage in [
            CartStage::CheckoutCreated,
            CartStage::CheckoutAbandoned,
            CartStage::CheckoutConverted,
            CartStage::UpsellConverted,
            CartStage::UpsellAbandoned,
            CartStage::UpsellDeclined,
        ] {
            assert!(!stage.can_resolve_upsell(), "{stage}");
        }
        assert!(CartStage::UpsellCreated.can_resolve_upsell());
    }

    #[test]
    fn terminal_stages() {
        assert!(CartStage::UpsellConverted.is_terminal());
        assert!(CartStage::UpsellAbandoned.is_terminal());
        assert!(CartStage::UpsellDeclined.is_terminal());
        assert!(!CartStage::CheckoutConverted.is_terminal());
        assert!(!CartStage::UpsellCreated.is_terminal());
    }

    #[test]
    fn rank_is_monotone_along_the_happy_path() {
        let path = [
            CartStage::CheckoutCreated,
            CartStage::CheckoutAbandoned,
            CartStage::CheckoutConverted,
            CartStage::UpsellCreated,
            CartStage::UpsellConverted,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn wire_name_round_trip() {
        for stage in [
            CartStage::CheckoutCreated,
            CartStage::CheckoutAbandoned,
            CartStage::CheckoutConverted,
            CartStage::UpsellCreated,
            CartStage::UpsellConverted,
            CartStage::UpsellAbandoned,
            CartStage::UpsellDeclined,
        ] {
            assert_eq!(CartStage::parse(stage.as_str()), Some(stage));
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
        assert_eq!(CartStage::parse("paymentPending"), None);
    }
}
