//! Checkout orchestration for the cart funnel.
//!
//! The [`CheckoutEngine`] drives the cart lifecycle:
//! 1. open a checkout (payment intent keyed by cart id)
//! 2. apply client edits while the checkout is still open
//! 3. reconcile the provider webhook (authoritative, idempotent)
//! 4. resolve the upsell offer (buy / decline / abandon)
//! 5. refunds and fulfillment
//!
//! External collaborators (payment provider, shipping estimator, email
//! sender) sit behind traits with in-memory implementations for testing.

pub mod abandon;
pub mod engine;
pub mod error;
pub mod fees;
pub mod services;

pub use abandon::{AbandonmentWorker, SweepOutcome};
pub use engine::{
    CheckoutConfig, CheckoutEngine, CreatedCart, FulfillmentRequest, UpsellOutcome,
};
pub use error::{CheckoutError, Result};
pub use fees::{FeeBreakdown, application_fee};
pub use services::{
    Charge, ChargeMetadata, EmailSender, EmailTemplate, InMemoryEmailSender,
    InMemoryPaymentProvider, InMemoryShippingEstimator, IntentRequest, Package, PaymentIntent,
    PaymentProvider, Rate, ReceiptLine, SentEmail, ShippingEstimator,
};
