//! Abandonment handling: per-cart delayed checks plus a periodic sweep.
//!
//! Two mechanisms watch for carts stuck in `upsellCreated`: a delayed task
//! scheduled at conversion time, and a periodic sweep that catches carts
//! whose task never fired. Both funnel through the same stage
//! compare-and-swap, and the receipt claim keeps the email at-most-once
//! even when they race a concurrent upsell purchase.

use std::time::Duration;

use chrono::Utc;
use common::CartId;

use cart::{CartStage, FunnelStore, StoreError};

use crate::error::{CheckoutError, Result};
use crate::services::email::{EmailSender, EmailTemplate};

/// Counts of carts flipped by one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub upsell_abandoned: u32,
    pub checkout_abandoned: u32,
}

/// Runs abandonment transitions out-of-band from the request path.
#[derive(Clone)]
pub struct AbandonmentWorker<S, E> {
    store: S,
    email: E,
    delay: Duration,
}

impl<S, E> AbandonmentWorker<S, E>
where
    S: FunnelStore + Clone + 'static,
    E: EmailSender + Clone + 'static,
{
    pub fn new(store: S, email: E, delay: Duration) -> Self {
        Self {
            store,
            email,
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules the delayed per-cart check.
    pub fn schedule_check(&self, cart_id: CartId) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(worker.delay).await;
            match worker.check_upsell_abandoned(cart_id).await {
                Ok(true) => tracing::info!(%cart_id, "upsell offer abandoned"),
                Ok(false) => {}
                Err(e) => tracing::warn!(%cart_id, error = %e, "abandonment check failed"),
            }
        })
    }

    /// Flips a still-pending upsell offer to `upsellAbandoned` and sends the
    /// deferred receipt. Returns true when this call owned the transition.
    pub async fn check_upsell_abandoned(&self, cart_id: CartId) -> Result<bool> {
        let Some(mut cart) = self.store.get_cart(cart_id).await? else {
            return Ok(false);
        };

        if cart.stage != CartStage::UpsellCreated {
            return Ok(false);
        }
        if self.store.receipt_sent(cart_id).await? {
            return Ok(false);
        }

        cart.mark_upsell_abandoned()?;
        match self
            .store
            .update_cart_guarded(&cart, &[CartStage::UpsellCreated])
            .await
        {
            Ok(()) => {}
            // Another path (purchase, decline, or the sweep) won the swap.
            Err(StoreError::StageConflict { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("checkout_upsells_abandoned_total").increment(1);

        if self.store.claim_receipt(cart_id).await? {
            if let Some(to) = cart.email.clone() {
                if let Err(e) = self
                    .email
                    .send(&to, &[], EmailTemplate::receipt_for(&cart))
                    .await
                {
                    tracing::warn!(%cart_id, error = %e, "receipt email failed after abandonment");
                }
            } else {
                tracing::warn!(%cart_id, "no buyer email on abandoned cart, receipt skipped");
            }
        }

        Ok(true)
    }

    /// One sweep pass: abandons overdue upsell offers and flags stale
    /// pre-payment checkouts.
    pub async fn sweep_once(&self) -> Result<SweepOutcome> {
        let delay = chrono::Duration::from_std(self.delay)
            .map_err(|e| CheckoutError::Validation(format!("invalid abandon delay: {e}")))?;
        let cutoff = Utc::now() - delay;
        let mut outcome = SweepOutcome::default();

        for cart in self
            .store
            .carts_in_stage_before(CartStage::UpsellCreated, cutoff)
            .await?
        {
            if self.check_upsell_abandoned(cart.id).await? {
                outcome.upsell_abandoned += 1;
            }
        }

        for mut cart in self
            .store
            .carts_in_stage_before(CartStage::CheckoutCreated, cutoff)
            .await?
        {
            // The cart may have converted between the query and this pass.
            if cart.mark_checkout_abandoned().is_err() {
                continue;
            }
            match self
                .store
                .update_cart_guarded(&cart, &[CartStage::CheckoutCreated])
                .await
            {
                Ok(()) => outcome.checkout_abandoned += 1,
                Err(StoreError::StageConflict { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(outcome)
    }

    /// Spawns the periodic sweep loop.
    pub fn run_sweep(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so a fresh boot doesn't
            // sweep before anything can be due.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match worker.sweep_once().await {
                    Ok(outcome) => {
                        if outcome.upsell_abandoned > 0 || outcome.checkout_abandoned > 0 {
                            tracing::info!(
                                upsell_abandoned = outcome.upsell_abandoned,
                                checkout_abandoned = outcome.checkout_abandoned,
                                "abandonment sweep flipped carts"
                            );
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "abandonment sweep failed"),
                }
            }
        })
    }
}
