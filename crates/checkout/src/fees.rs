//! Platform fee computation.

use cart::Money;

/// Fee split for a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    /// Platform revenue: a rounded percentage of the product amount.
    pub platform_fee: Money,
    /// The full application fee withheld from the seller's payout.
    /// VAT and shipping pass through it to the platform for remittance and
    /// label purchase; they are never taxed as platform revenue.
    pub application_fee: Money,
}

/// Computes the platform fee and total application fee for a charge.
pub fn application_fee(
    product_amount: Money,
    vat_amount: Money,
    shipping_and_handling: Money,
    fee_percent: f64,
) -> FeeBreakdown {
    let platform_fee = product_amount.percentage(fee_percent);
    FeeBreakdown {
        platform_fee,
        application_fee: platform_fee + vat_amount + shipping_and_handling,
    }
}
