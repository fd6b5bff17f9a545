//! The checkout engine: cart lifecycle orchestration.
//!
//! Each public method is one stateless handler invocation; there is no
//! in-process shared cart state. Coordination happens through the persisted
//! cart row (guarded updates) and the payment provider's idempotency
//! guarantees.

use std::time::Duration;

use common::{CartId, VisitorContext};

use cart::{
    Cart, CartError, CartFulfillment, CartFunnel, CartLine, CartStage, ChargeEnvironment,
    CheckoutDraft, CheckoutPatch, Fan, FunnelStore, Money, StoreError, Workspace, is_fully_fulfilled,
    vat_rate,
};
use pipeline::{AssetKind, AssetRef, EventRecorder, EventType, PurchaseData, RecordRequest};

use crate::abandon::AbandonmentWorker;
use crate::error::{CheckoutError, Result};
use crate::fees::application_fee;
use crate::services::email::{EmailSender, EmailTemplate};
use crate::services::payment::{Charge, ChargeMetadata, IntentRequest, PaymentProvider};
use crate::services::shipping::{Package, ShippingEstimator};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub environment: ChargeEnvironment,
    /// Initial delay between fan-resolution polls.
    pub fan_poll_interval: Duration,
    /// Upper bound on the whole fan-resolution wait.
    pub fan_poll_timeout: Duration,
    /// How long an upsell offer may sit before it is abandoned.
    pub abandon_delay: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            environment: ChargeEnvironment::Production,
            fan_poll_interval: Duration::from_secs(1),
            fan_poll_timeout: Duration::from_secs(20),
            abandon_delay: Duration::from_secs(600),
        }
    }
}

/// Result of opening a checkout.
#[derive(Debug, Clone)]
pub struct CreatedCart {
    pub cart: Cart,
    /// Client secret of the payment intent, for the browser to confirm.
    pub client_secret: String,
}

/// Result of resolving the upsell offer.
#[derive(Debug, Clone)]
pub struct UpsellOutcome {
    pub cart: Cart,
    /// Where the buyer is sent next (the funnel's success route).
    pub redirect_handle: String,
    pub redirect_key: String,
    pub payment_status: &'static str,
}

/// Request to record a shipment against a cart.
#[derive(Debug, Clone)]
pub struct FulfillmentRequest {
    pub product_ids: Vec<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub label_cost: Money,
}

/// Orchestrates carts across the payment provider, the shipping estimator,
/// the email sender and the event pipeline.
pub struct CheckoutEngine<S, P, Sh, E>
where
    S: FunnelStore + Clone + 'static,
    P: PaymentProvider,
    Sh: ShippingEstimator,
    E: EmailSender + Clone + 'static,
{
    store: S,
    payment: P,
    shipping: Sh,
    email: E,
    recorder: EventRecorder,
    abandon: AbandonmentWorker<S, E>,
    config: CheckoutConfig,
}

impl<S, P, Sh, E> CheckoutEngine<S, P, Sh, E>
where
    S: FunnelStore + Clone + 'static,
    P: PaymentProvider,
    Sh: ShippingEstimator,
    E: EmailSender + Clone + 'static,
{
    pub fn new(
        store: S,
        payment: P,
        shipping: Sh,
        email: E,
        recorder: EventRecorder,
        config: CheckoutConfig,
    ) -> Self {
        let abandon = AbandonmentWorker::new(store.clone(), email.clone(), config.abandon_delay);
        Self {
            store,
            payment,
            shipping,
            email,
            recorder,
            abandon,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// The abandonment worker, for wiring the periodic sweep.
    pub fn abandonment(&self) -> &AbandonmentWorker<S, E> {
        &self.abandon
    }

    /// Opens a checkout: computes amounts, estimates shipping when a
    /// destination is known, and creates the provider payment intent with
    /// the cart id as idempotency key.
    #[tracing::instrument(skip(self, visitor, draft))]
    pub async fn create_cart(
        &self,
        handle: &str,
        key: &str,
        visitor: VisitorContext,
        draft: CheckoutDraft,
    ) -> Result<CreatedCart> {
        let funnel = self
            .store
            .get_funnel_by_key(handle, key)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                kind: "funnel",
                id: format!("{handle}/{key}"),
            })?;
        let workspace = self.workspace_for(&funnel).await?;
        let account = self.connected_account(&workspace)?;

        let mut cart = Cart::create(&funnel, visitor, draft)?;

        if let Some(ship_to) = cart.ship_to.clone() {
            self.estimate_checkout_shipping(&mut cart, &ship_to.postal_code)
                .await;
        }

        let fees = self.checkout_fees(&cart, &funnel, &workspace);
        let intent = self
            .payment
            .create_payment_intent(IntentRequest {
                account_id: account,
                amount: cart.checkout_amount,
                application_fee: fees,
                metadata: ChargeMetadata {
                    cart_id: cart.id,
                    pre_charge_stage: cart.stage,
                },
                idempotency_key: cart.id.to_string(),
            })
            .await?;
        cart.payment_intent_id = Some(intent.id);

        self.store.insert_cart(cart.clone()).await?;
        metrics::counter!("checkout_carts_created_total").increment(1);

        self.record_cart_event(&workspace, &funnel, &cart, EventType::CartCheckoutStarted)
            .await;

        Ok(CreatedCart {
            cart,
            client_secret: intent.client_secret,
        })
    }

    /// Applies a client-submitted edit while the checkout is still open,
    /// re-estimates shipping when the postal code changed, and resizes the
    /// existing payment intent. Never creates a second intent.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_checkout(&self, cart_id: CartId, patch: CheckoutPatch) -> Result<Cart> {
        let mut cart = self.require_cart(cart_id).await?;
        let funnel = self.require_funnel(&cart).await?;
        let workspace = self.workspace_for(&funnel).await?;

        let postal_changed = cart.apply_client_patch(&funnel, patch)?;
        if postal_changed && let Some(ship_to) = cart.ship_to.clone() {
            self.estimate_checkout_shipping(&mut cart, &ship_to.postal_code)
                .await;
        }

        // The same conditional update that advances stage also fences this
        // write: once the provider captured funds, the edit loses the swap.
        self.store
            .update_cart_guarded(
                &cart,
                &[CartStage::CheckoutCreated, CartStage::CheckoutAbandoned],
            )
            .await?;

        let intent_id = cart.payment_intent_id.clone().ok_or_else(|| {
            CheckoutError::Validation("cart has no payment intent".to_string())
        })?;
        let fees = self.checkout_fees(&cart, &funnel, &workspace);
        self.payment
            .update_payment_intent(&intent_id, cart.checkout_amount, fees)
            .await?;

        Ok(cart)
    }

    /// Webhook reconciliation for a captured main charge. Authoritative and
    /// idempotent: redeliveries and client races no-op.
    #[tracing::instrument(skip(self, charge), fields(cart_id = %charge.metadata.cart_id))]
    pub async fn reconcile_payment_success(&self, charge: Charge) -> Result<()> {
        let cart_id = charge.metadata.cart_id;
        let mut cart = self.require_cart(cart_id).await?;

        if cart.stage.is_converted() {
            tracing::info!("webhook redelivery ignored, cart already converted");
            return Ok(());
        }

        let funnel = self.require_funnel(&cart).await?;
        let workspace = self.workspace_for(&funnel).await?;

        let fan = self.resolve_fan(&charge, &cart).await?;
        let order_number = self.store.count_orders(cart.workspace_id).await? as i64 + 1;

        cart.fan_id = Some(fan.id);
        cart.order_id = Some(order_number);
        cart.charge_id = Some(charge.id.clone());
        if cart.payment_method_id.is_none() {
            cart.payment_method_id = charge.payment_method_id.clone();
        }
        if cart.provider_customer_id.is_none() {
            cart.provider_customer_id = charge.customer_id.clone();
        }
        if cart.email.is_none() {
            cart.email = charge.email.clone();
        }

        cart.convert_checkout(funnel.has_upsell())?;
        match self
            .store
            .update_cart_guarded(
                &cart,
                &[CartStage::CheckoutCreated, CartStage::CheckoutAbandoned],
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::StageConflict { .. }) => {
                tracing::info!("concurrent reconciliation already converted this cart");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("checkout_conversions_total").increment(1);
        tracing::info!(order_id = order_number, stage = %cart.stage, "cart converted");

        self.record_cart_event(&workspace, &funnel, &cart, EventType::CartPurchase)
            .await;
        self.add_value_attribution(&cart, cart.order_amount).await;

        if funnel.has_upsell() {
            let _ = self.abandon.schedule_check(cart.id);
        } else {
            self.send_receipt_once(&cart).await;
        }

        Ok(())
    }

    /// Buys the post-purchase upsell with the stored payment method.
    ///
    /// Tolerates the webhook race by polling for the fan with bounded
    /// backoff, and is a no-op success when the upsell already converted
    /// (a refreshed or resubmitted page never double-charges).
    #[tracing::instrument(skip(self))]
    pub async fn buy_upsell(
        &self,
        cart_id: CartId,
        apparel_size: Option<String>,
    ) -> Result<UpsellOutcome> {
        let mut cart = self.wait_for_fan(cart_id).await?;
        let funnel = self.require_funnel(&cart).await?;

        if cart.stage == CartStage::UpsellConverted {
            return Ok(UpsellOutcome {
                cart,
                redirect_handle: funnel.handle,
                redirect_key: funnel.key,
                payment_status: "succeeded",
            });
        }
        if !cart.stage.can_resolve_upsell() {
            return Err(CartError::InvalidStageTransition {
                stage: cart.stage,
                action: "buy upsell",
            }
            .into());
        }

        let workspace = self.workspace_for(&funnel).await?;
        let account = self.connected_account(&workspace)?;

        let product = funnel.upsell_product.clone().ok_or_else(|| {
            CheckoutError::Validation("funnel has no upsell product".to_string())
        })?;
        if product.is_apparel && apparel_size.is_none() {
            return Err(CheckoutError::Validation(
                "apparel upsell requires a size".to_string(),
            ));
        }
        let payment_method = cart.payment_method_id.clone().ok_or_else(|| {
            CheckoutError::Validation("cart has no stored payment method".to_string())
        })?;

        let mut line = CartLine::new(
            product.id.clone(),
            product.name.clone(),
            1,
            funnel.upsell_price().unwrap_or(product.price),
        );
        line.apparel_size = apparel_size;

        let shipping = match &cart.ship_to {
            Some(ship_to) => self.cheapest_rate(ship_to).await,
            None => Money::zero(),
        };
        let vat = line
            .total()
            .percentage(vat_rate(cart.ship_to.as_ref().map(|a| a.country.as_str())));
        let upsell_total = line.total() + shipping + vat;

        let fee_percent = funnel
            .fee_percent_override
            .unwrap_or(workspace.fee_percent);
        let fees = application_fee(line.total(), vat, shipping, fee_percent);

        // Immediate-confirm charge; the provider assigns its own
        // idempotency, unlike the deferred main intent.
        let charge = self
            .payment
            .confirm_off_session(
                &account,
                &payment_method,
                upsell_total,
                fees.application_fee,
                ChargeMetadata {
                    cart_id: cart.id,
                    pre_charge_stage: cart.stage,
                },
            )
            .await?;

        cart.convert_upsell(line, shipping, vat)?;
        cart.upsell_charge_id = Some(charge.id.clone());

        match self
            .store
            .update_cart_guarded(&cart, &[CartStage::UpsellCreated])
            .await
        {
            Ok(()) => {}
            Err(StoreError::StageConflict { actual, .. }) => {
                // The abandonment path won the swap after we charged.
                // Money moved, so undo it explicitly and surface the loss.
                tracing::error!(%actual, "upsell charge raced a stage change, refunding");
                if let Err(e) = self.payment.create_refund(&charge.id, "upsell race").await {
                    tracing::error!(error = %e, "refund of raced upsell charge failed");
                }
                return Err(StoreError::StageConflict {
                    cart_id: cart.id,
                    actual,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("checkout_upsell_conversions_total").increment(1);

        self.record_cart_event(&workspace, &funnel, &cart, EventType::CartUpsellPurchase)
            .await;
        // Attribution gets the upsell delta only; the main order already
        // counted itself at reconciliation.
        self.add_value_attribution(&cart, cart.upsell_amount).await;
        self.send_receipt_once(&cart).await;

        Ok(UpsellOutcome {
            cart,
            redirect_handle: funnel.handle,
            redirect_key: funnel.key,
            payment_status: "succeeded",
        })
    }

    /// Declines the upsell offer and sends the main-order receipt.
    #[tracing::instrument(skip(self))]
    pub async fn decline_upsell(&self, cart_id: CartId) -> Result<Cart> {
        let mut cart = self.wait_for_fan(cart_id).await?;

        if cart.stage.is_terminal() {
            return Ok(cart);
        }

        let funnel = self.require_funnel(&cart).await?;
        let workspace = self.workspace_for(&funnel).await?;

        cart.decline_upsell()?;
        match self
            .store
            .update_cart_guarded(&cart, &[CartStage::UpsellCreated])
            .await
        {
            Ok(()) => {}
            Err(StoreError::StageConflict { .. }) => {
                // Another path resolved the offer first; nothing to undo.
                return self.require_cart(cart_id).await;
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("checkout_upsell_declines_total").increment(1);
        self.record_cart_event(&workspace, &funnel, &cart, EventType::CartUpsellDeclined)
            .await;
        self.send_receipt_once(&cart).await;

        Ok(cart)
    }

    /// Refunds the main charge and, independently, the upsell charge, then
    /// marks the cart canceled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_cart(&self, cart_id: CartId, reason: &str) -> Result<Cart> {
        let mut cart = self.require_cart(cart_id).await?;

        let charge_id = cart.charge_id.clone().ok_or_else(|| {
            CheckoutError::Validation("cart has no captured charge to refund".to_string())
        })?;

        self.payment.create_refund(&charge_id, reason).await?;

        if let Some(upsell_charge_id) = cart.upsell_charge_id.clone() {
            // The two refunds are independent network calls; the first one
            // stands even when the second fails.
            if let Err(e) = self.payment.create_refund(&upsell_charge_id, reason).await {
                return Err(CheckoutError::PaymentProvider(format!(
                    "main charge refunded; upsell refund failed: {e}"
                )));
            }
        }

        cart.mark_canceled(cart.order_amount)?;
        let stage = cart.stage;
        self.store.update_cart_guarded(&cart, &[stage]).await?;

        metrics::counter!("checkout_cancellations_total").increment(1);
        Ok(cart)
    }

    /// Records a shipment covering a subset of the purchased products and
    /// sends the shipping-update email.
    #[tracing::instrument(skip(self, request))]
    pub async fn create_fulfillment(
        &self,
        cart_id: CartId,
        request: FulfillmentRequest,
    ) -> Result<CartFulfillment> {
        let cart = self.require_cart(cart_id).await?;

        if !cart.stage.is_converted() {
            return Err(CartError::InvalidStageTransition {
                stage: cart.stage,
                action: "fulfill",
            }
            .into());
        }
        if request.product_ids.is_empty() {
            return Err(CheckoutError::Validation(
                "fulfillment covers no products".to_string(),
            ));
        }
        let purchased = cart.purchased_product_ids();
        for id in &request.product_ids {
            if !purchased.contains(id) {
                return Err(CheckoutError::Validation(format!(
                    "product {id} was not purchased on this cart"
                )));
            }
        }

        let existing = self.store.fulfillments_for_cart(cart_id).await?;
        let mut fulfillment = CartFulfillment::new(cart_id, request.product_ids);
        fulfillment.carrier = request.carrier;
        fulfillment.tracking_number = request.tracking_number;
        fulfillment.label_cost = request.label_cost;
        // Buyer-paid shipping is allocated to the first shipment.
        fulfillment.shipping_collected = if existing.is_empty() {
            cart.order_shipping_and_handling_amount
        } else {
            Money::zero()
        };

        self.store.insert_fulfillment(fulfillment.clone()).await?;

        if fulfillment.tracking_number.is_some()
            && let Some(to) = cart.email.clone()
        {
            let update = EmailTemplate::ShippingUpdate {
                cart_id,
                carrier: fulfillment.carrier.clone(),
                tracking_number: fulfillment.tracking_number.clone(),
            };
            if let Err(e) = self.email.send(&to, &[], update).await {
                tracing::warn!(error = %e, "shipping update email failed");
            }
        }

        if fulfillment.cost_delta().is_positive() {
            tracing::warn!(
                delta = %fulfillment.cost_delta(),
                "label cost exceeded shipping collected"
            );
        }

        Ok(fulfillment)
    }

    /// A cart's shipments plus whether they cover everything purchased.
    pub async fn fulfillment_status(
        &self,
        cart_id: CartId,
    ) -> Result<(Vec<CartFulfillment>, bool)> {
        let cart = self.require_cart(cart_id).await?;
        let fulfillments = self.store.fulfillments_for_cart(cart_id).await?;
        let complete = is_fully_fulfilled(&cart.purchased_product_ids(), &fulfillments);
        Ok((fulfillments, complete))
    }

    // -- internals --

    /// Polls the cart until the webhook attaches a fan, with bounded
    /// backoff. Terminal carts return immediately (their fan is set).
    async fn wait_for_fan(&self, cart_id: CartId) -> Result<Cart> {
        let start = tokio::time::Instant::now();
        let mut delay = self.config.fan_poll_interval;

        loop {
            let cart = self.require_cart(cart_id).await?;
            if cart.fan_id.is_some() || cart.stage.is_terminal() {
                return Ok(cart);
            }
            if start.elapsed() + delay > self.config.fan_poll_timeout {
                metrics::counter!("checkout_fan_poll_timeouts_total").increment(1);
                return Err(CheckoutError::FanResolutionTimeout(cart_id));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(5));
        }
    }

    async fn resolve_fan(&self, charge: &Charge, cart: &Cart) -> Result<Fan> {
        let email = charge
            .email
            .clone()
            .or_else(|| cart.email.clone())
            .ok_or_else(|| {
                CheckoutError::Validation("charge carries no buyer email".to_string())
            })?;

        if let Some(fan) = self.store.find_fan_by_email(&email).await? {
            return Ok(fan);
        }
        if let Some(customer_id) = &charge.customer_id {
            if let Some(fan) = self
                .store
                .find_fan_by_provider_customer(customer_id)
                .await?
            {
                return Ok(fan);
            }
        }

        let mut fan = Fan::from_email(&email);
        fan.provider_customer_id = charge.customer_id.clone();
        match self.store.insert_fan(fan.clone()).await {
            Ok(()) => Ok(fan),
            // Concurrent reconciliation created the fan first; use theirs.
            Err(StoreError::Duplicate { .. }) => self
                .store
                .find_fan_by_email(&email)
                .await?
                .ok_or(CheckoutError::NotFound {
                    kind: "fan",
                    id: email,
                }),
            Err(e) => Err(e.into()),
        }
    }

    async fn estimate_checkout_shipping(&self, cart: &mut Cart, postal_code: &str) {
        let Some(ship_to) = cart.ship_to.clone() else {
            return;
        };
        match self
            .shipping
            .estimate_rates(&ship_to, &Package::default())
            .await
        {
            Ok(rates) => {
                let cheapest = rates.first().map(|r| r.amount).unwrap_or(Money::zero());
                cart.set_checkout_shipping(cheapest, Some(postal_code.to_string()));
            }
            Err(e) => {
                // Degrade gracefully: never block checkout on a rate quote.
                tracing::warn!(error = %e, "shipping estimate failed, proceeding without");
                cart.mark_shipping_unresolved();
            }
        }
    }

    async fn cheapest_rate(&self, ship_to: &cart::Address) -> Money {
        match self
            .shipping
            .estimate_rates(ship_to, &Package::default())
            .await
        {
            Ok(rates) => rates.first().map(|r| r.amount).unwrap_or(Money::zero()),
            Err(e) => {
                tracing::warn!(error = %e, "upsell shipping estimate failed, proceeding without");
                Money::zero()
            }
        }
    }

    fn checkout_fees(&self, cart: &Cart, funnel: &CartFunnel, workspace: &Workspace) -> Money {
        let fee_percent = funnel
            .fee_percent_override
            .unwrap_or(workspace.fee_percent);
        application_fee(
            cart.checkout_product_amount,
            cart.checkout_vat_amount,
            cart.checkout_shipping_and_handling(),
            fee_percent,
        )
        .application_fee
    }

    fn connected_account(&self, workspace: &Workspace) -> Result<String> {
        workspace
            .connected_account(self.config.environment)
            .map(String::from)
            .ok_or(CheckoutError::ProviderAccountMissing {
                environment: self.config.environment,
            })
    }

    async fn workspace_for(&self, funnel: &CartFunnel) -> Result<Workspace> {
        self.store
            .get_workspace(funnel.workspace_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                kind: "workspace",
                id: funnel.workspace_id.to_string(),
            })
    }

    async fn require_cart(&self, cart_id: CartId) -> Result<Cart> {
        self.store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                kind: "cart",
                id: cart_id.to_string(),
            })
    }

    async fn require_funnel(&self, cart: &Cart) -> Result<CartFunnel> {
        self.store
            .get_funnel(cart.funnel_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                kind: "funnel",
                id: cart.funnel_id.to_string(),
            })
    }

    /// Sends the buyer receipt at most once per cart, guarded by the
    /// atomic receipt claim. Email failure never rolls back a transition.
    async fn send_receipt_once(&self, cart: &Cart) {
        match self.store.claim_receipt(cart.id).await {
            Ok(true) => {
                let Some(to) = cart.email.clone() else {
                    tracing::warn!(cart_id = %cart.id, "no buyer email, receipt skipped");
                    return;
                };
                if let Err(e) = self
                    .email
                    .send(&to, &[], EmailTemplate::receipt_for(cart))
                    .await
                {
                    tracing::warn!(cart_id = %cart.id, error = %e, "receipt email failed");
                } else {
                    metrics::counter!("checkout_receipts_sent_total").increment(1);
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(cart_id = %cart.id, error = %e, "receipt claim failed"),
        }
    }

    async fn record_cart_event(
        &self,
        workspace: &Workspace,
        funnel: &CartFunnel,
        cart: &Cart,
        event_type: EventType,
    ) {
        let purchase = match event_type {
            EventType::CartPurchase => Some(PurchaseData {
                cart_id: cart.id,
                order_id: cart.order_id,
                product_amount: cart.checkout_product_amount,
                shipping_and_handling_amount: cart.checkout_shipping_and_handling(),
                vat_amount: cart.checkout_vat_amount,
                amount: cart.checkout_amount,
            }),
            EventType::CartUpsellPurchase => Some(PurchaseData {
                cart_id: cart.id,
                order_id: cart.order_id,
                product_amount: cart.upsell_product_amount,
                shipping_and_handling_amount: cart.upsell_shipping_amount,
                vat_amount: cart.upsell_vat_amount,
                amount: cart.upsell_amount,
            }),
            _ => None,
        };

        let outcome = self
            .recorder
            .record(RecordRequest {
                workspace: workspace.clone(),
                asset: AssetRef::new(AssetKind::CartFunnel, funnel.id.to_string()),
                event_type,
                visitor: cart.visitor.clone(),
                purchase,
                source_url: None,
            })
            .await;
        tracing::debug!(?outcome, "cart event recorded");
    }

    /// Adds the given amount to every attribution asset on the cart's
    /// visitor snapshot, each as its own atomic statement. Failures are
    /// logged and do not unwind the financial transition.
    async fn add_value_attribution(&self, cart: &Cart, delta: Money) {
        let attribution = &cart.visitor.attribution;
        let mut keys = vec![format!("cart:{}", cart.funnel_id)];
        if let Some(id) = &attribution.ad_id {
            keys.push(format!("ad:{id}"));
        }
        if let Some(id) = &attribution.broadcast_id {
            keys.push(format!("broadcast:{id}"));
        }
        if let Some(id) = &attribution.flow_step_id {
            keys.push(format!("flow:{id}"));
        }
        if let Some(id) = &attribution.landing_page_id {
            keys.push(format!("page:{id}"));
        }

        for key in keys {
            if let Err(e) = self.store.add_asset_value(&key, delta).await {
                tracing::warn!(%key, error = %e, "value attribution increment failed");
            }
        }
    }
}
