//! External service traits with in-memory implementations for testing.

pub mod email;
pub mod payment;
pub mod shipping;

pub use email::{EmailSender, EmailTemplate, InMemoryEmailSender, ReceiptLine, SentEmail};
pub use payment::{
    Charge, ChargeMetadata, InMemoryPaymentProvider, IntentRequest, PaymentIntent, PaymentProvider,
};
pub use shipping::{InMemoryShippingEstimator, Package, Rate, ShippingEstimator};
