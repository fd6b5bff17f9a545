//! Shipping estimator trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use cart::{Address, Money};

use crate::error::CheckoutError;

/// Parcel dimensions for a rate estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    pub weight_oz: u32,
}

impl Default for Package {
    fn default() -> Self {
        Self { weight_oz: 16 }
    }
}

/// One carrier rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rate {
    pub carrier: String,
    pub service: String,
    pub amount: Money,
}

/// Rate estimation against the external shipping provider. The origin
/// address is provider configuration, not per-call input.
#[async_trait]
pub trait ShippingEstimator: Send + Sync {
    /// Rates for a destination, sorted ascending by price; the funnel
    /// always takes the cheapest.
    async fn estimate_rates(
        &self,
        to: &Address,
        package: &Package,
    ) -> Result<Vec<Rate>, CheckoutError>;
}

#[derive(Default)]
struct InMemoryShippingState {
    rates: Vec<Rate>,
    fail_on_estimate: bool,
}

/// In-memory shipping estimator for testing.
#[derive(Clone)]
pub struct InMemoryShippingEstimator {
    state: Arc<RwLock<InMemoryShippingState>>,
}

impl Default for InMemoryShippingEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryShippingEstimator {
    pub fn new() -> Self {
        let state = InMemoryShippingState {
            rates: vec![
                Rate {
                    carrier: "usps".to_string(),
                    service: "ground".to_string(),
                    amount: Money::from_cents(450),
                },
                Rate {
                    carrier: "ups".to_string(),
                    service: "2day".to_string(),
                    amount: Money::from_cents(1100),
                },
            ],
            fail_on_estimate: false,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn set_fail_on_estimate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_estimate = fail;
    }

    /// Replaces the configured rates (kept sorted ascending).
    pub fn set_rates(&self, mut rates: Vec<Rate>) {
        rates.sort_by_key(|r| r.amount);
        self.state.write().unwrap().rates = rates;
    }
}

#[async_trait]
impl ShippingEstimator for InMemoryShippingEstimator {
    async fn estimate_rates(
        &self,
        _to: &Address,
        _package: &Package,
    ) -> Result<Vec<Rate>, CheckoutError> {
        let state = self.state.read().unwrap();

        if state.fail_on_estimate {
            return Err(CheckoutError::Validation(
                "shipping provider unavailable".to_string(),
            ));
        }

        Ok(state.rates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination() -> Address {
        Address {
            postal_code: "94107".to_string(),
            country: "US".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rates_come_back_sorted_ascending() {
        let estimator = InMemoryShippingEstimator::new();
        let rates = estimator
            .estimate_rates(&destination(), &Package::default())
            .await
            .unwrap();

        assert!(!rates.is_empty());
        for pair in rates.windows(2) {
            assert!(pair[0].amount <= pair[1].amount);
        }
    }

    #[tokio::test]
    async fn set_rates_resorts() {
        let estimator = InMemoryShippingEstimator::new();
        estimator.set_rates(vec![
            Rate {
                carrier: "ups".to_string(),
                service: "2day".to_string(),
                amount: Money::from_cents(900),
            },
            Rate {
                carrier: "usps".to_string(),
                service: "ground".to_string(),
                amount: Money::from_cents(300),
            },
        ]);

        let rates = estimator
            .estimate_rates(&destination(), &Package::default())
            .await
            .unwrap();
        assert_eq!(rates[0].amount, Money::from_cents(300));
    }

    #[tokio::test]
    async fn failure_toggle() {
        let estimator = InMemoryShippingEstimator::new();
        estimator.set_fail_on_estimate(true);
        assert!(
            estimator
                .estimate_rates(&destination(), &Package::default())
                .await
                .is_err()
        );
    }
}
