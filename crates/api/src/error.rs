//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::{CartError, StoreError};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout orchestration error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Validation(_) | CheckoutError::Cart(CartError::Validation(_)) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CheckoutError::Cart(CartError::InvalidStageTransition { .. })
        | CheckoutError::Store(StoreError::StageConflict { .. })
        | CheckoutError::Store(StoreError::Duplicate { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        CheckoutError::NotFound { .. } | CheckoutError::Store(StoreError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        // Buyer-retryable: the provider rejected or errored on the charge.
        CheckoutError::PaymentProvider(_) => (StatusCode::PAYMENT_REQUIRED, err.to_string()),
        CheckoutError::ProviderAccountMissing { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        CheckoutError::FanResolutionTimeout(_) => (StatusCode::REQUEST_TIMEOUT, err.to_string()),
        CheckoutError::Email(_) | CheckoutError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Checkout(CheckoutError::Store(err))
    }
}
