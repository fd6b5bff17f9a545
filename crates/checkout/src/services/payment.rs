//! Payment provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CartId;
use serde::{Deserialize, Serialize};

use cart::{CartStage, Money};

use crate::error::CheckoutError;

/// Metadata round-tripped through the provider on every charge, used to key
/// webhook reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeMetadata {
    pub cart_id: CartId,
    pub pre_charge_stage: CartStage,
}

/// Request to open a deferred-capture payment intent.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    /// Connected account to charge against.
    pub account_id: String,
    pub amount: Money,
    pub application_fee: Money,
    pub metadata: ChargeMetadata,
    /// At-most-once token; the cart id for the main charge.
    pub idempotency_key: String,
}

/// An open payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the client to complete payment in the browser.
    pub client_secret: String,
}

/// A captured charge, as delivered by the provider webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub payment_intent_id: String,
    pub amount: Money,
    pub email: Option<String>,
    pub customer_id: Option<String>,
    /// Stored for off-session reuse by the upsell charge.
    pub payment_method_id: Option<String>,
    pub metadata: ChargeMetadata,
}

/// Payment-provider operations used by the funnel.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a deferred-capture intent. Idempotent on
    /// `request.idempotency_key`: a retried call returns the original
    /// intent rather than opening a second one.
    async fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> Result<PaymentIntent, CheckoutError>;

    /// Resizes an existing intent. Never creates a new one.
    async fn update_payment_intent(
        &self,
        intent_id: &str,
        amount: Money,
        application_fee: Money,
    ) -> Result<(), CheckoutError>;

    /// Creates and immediately confirms an off-session charge against a
    /// stored payment method (the upsell purchase).
    async fn confirm_off_session(
        &self,
        account_id: &str,
        payment_method_id: &str,
        amount: Money,
        application_fee: Money,
        metadata: ChargeMetadata,
    ) -> Result<Charge, CheckoutError>;

    /// Refunds a captured charge.
    async fn create_refund(&self, charge_id: &str, reason: &str) -> Result<(), CheckoutError>;
}

#[derive(Debug, Clone)]
struct IntentRecord {
    intent: PaymentIntent,
    amount: Money,
    application_fee: Money,
    metadata: ChargeMetadata,
}

#[derive(Default)]
struct InMemoryPaymentState {
    intents: HashMap<String, IntentRecord>,
    by_idempotency_key: HashMap<String, String>,
    charges: HashMap<String, Charge>,
    refunds: Vec<(String, String)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_update: bool,
    fail_on_confirm: bool,
    fail_on_refund: bool,
    fail_refund_for: Option<String>,
}

/// In-memory payment provider for testing.
///
/// Enforces idempotency-key dedup so the "one intent per cart id" property
/// is observable, and can mint the webhook charge a real provider would
/// deliver asynchronously.
#[derive(Clone, Default)]
pub struct InMemoryPaymentProvider {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    pub fn set_fail_on_update(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update = fail;
    }

    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.state.write().unwrap().fail_on_confirm = fail;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Fails refunds for one specific charge only.
    pub fn set_fail_refund_for(&self, charge_id: Option<String>) {
        self.state.write().unwrap().fail_refund_for = charge_id;
    }

    /// Number of open intents.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Current amount of an intent.
    pub fn intent_amount(&self, intent_id: &str) -> Option<Money> {
        self.state
            .read()
            .unwrap()
            .intents
            .get(intent_id)
            .map(|r| r.amount)
    }

    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    pub fn has_refund(&self, charge_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .refunds
            .iter()
            .any(|(id, _)| id == charge_id)
    }

    /// Simulates the provider capturing an intent and delivering the
    /// webhook charge for it.
    pub fn capture_intent(&self, intent_id: &str, email: &str) -> Charge {
        let mut state = self.state.write().unwrap();
        let record = state
            .intents
            .get(intent_id)
            .cloned()
            .unwrap_or_else(|| panic!("unknown intent {intent_id}"));

        state.next_id += 1;
        let n = state.next_id;
        let charge = Charge {
            id: format!("ch_{n:04}"),
            payment_intent_id: intent_id.to_string(),
            amount: record.amount,
            email: Some(email.to_string()),
            customer_id: Some(format!("cus_{n:04}")),
            payment_method_id: Some(format!("pm_{n:04}")),
            metadata: record.metadata,
        };
        state.charges.insert(charge.id.clone(), charge.clone());
        charge
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> Result<PaymentIntent, CheckoutError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(CheckoutError::PaymentProvider(
                "card declined".to_string(),
            ));
        }

        // Idempotent replay returns the original intent.
        if let Some(intent_id) = state.by_idempotency_key.get(&request.idempotency_key) {
            let record = &state.intents[intent_id];
            return Ok(record.intent.clone());
        }

        state.next_id += 1;
        let n = state.next_id;
        let intent = PaymentIntent {
            id: format!("pi_{n:04}"),
            client_secret: format!("pi_{n:04}_secret"),
        };
        state
            .by_idempotency_key
            .insert(request.idempotency_key.clone(), intent.id.clone());
        state.intents.insert(
            intent.id.clone(),
            IntentRecord {
                intent: intent.clone(),
                amount: request.amount,
                application_fee: request.application_fee,
                metadata: request.metadata,
            },
        );

        Ok(intent)
    }

    async fn update_payment_intent(
        &self,
        intent_id: &str,
        amount: Money,
        application_fee: Money,
    ) -> Result<(), CheckoutError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_update {
            return Err(CheckoutError::PaymentProvider(
                "intent not updatable".to_string(),
            ));
        }

        let record = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| CheckoutError::PaymentProvider(format!("no such intent {intent_id}")))?;
        record.amount = amount;
        record.application_fee = application_fee;
        Ok(())
    }

    async fn confirm_off_session(
        &self,
        _account_id: &str,
        payment_method_id: &str,
        amount: Money,
        _application_fee: Money,
        metadata: ChargeMetadata,
    ) -> Result<Charge, CheckoutError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_confirm {
            return Err(CheckoutError::PaymentProvider(
                "off-session confirmation failed".to_string(),
            ));
        }

        state.next_id += 1;
        let n = state.next_id;
        let charge = Charge {
            id: format!("ch_{n:04}"),
            payment_intent_id: format!("pi_{n:04}"),
            amount,
            email: None,
            customer_id: None,
            payment_method_id: Some(payment_method_id.to_string()),
            metadata,
        };
        state.charges.insert(charge.id.clone(), charge.clone());
        Ok(charge)
    }

    async fn create_refund(&self, charge_id: &str, reason: &str) -> Result<(), CheckoutError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_refund || state.fail_refund_for.as_deref() == Some(charge_id) {
            return Err(CheckoutError::PaymentProvider(
                "refund rejected".to_string(),
            ));
        }

        state
            .refunds
            .push((charge_id.to_string(), reason.to_string()));
        Ok(())
    }
}
