//! Checkout error types.

use common::CartId;
use thiserror::Error;

use cart::{CartError, ChargeEnvironment, StoreError};

/// Errors from checkout orchestration.
///
/// Propagation policy: anything that has already moved money is never
/// silently retried here; a retry must be an explicit new idempotent call
/// from the caller. Anything downstream of money (emails, analytics, ad
/// attribution) is isolated and never surfaces through this type.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Bad client input, rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// Cart domain error (stage guard or validation).
    #[error("cart error: {0}")]
    Cart(#[from] CartError),

    /// Persistence error, including stage conflicts from guarded updates.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The workspace has no connected payment account for the active
    /// environment. Fatal to the request, not retried.
    #[error("no payment account configured for the {environment} environment")]
    ProviderAccountMissing { environment: ChargeEnvironment },

    /// Provider error creating, resizing or confirming a payment intent.
    /// Surfaced verbatim so the buyer can retry payment.
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    /// The fan was not attached within the polling bound (webhook race).
    /// Surfaced so the client can retry the upsell step.
    #[error("timed out waiting for fan resolution on cart {0}")]
    FanResolutionTimeout(CartId),

    /// Email sender failure. Logged by callers; never rolls back a stage.
    #[error("email error: {0}")]
    Email(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
