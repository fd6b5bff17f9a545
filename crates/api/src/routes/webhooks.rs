//! Payment provider webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use cart::FunnelStore;
use checkout::Charge;

use crate::error::ApiError;
use crate::routes::carts::AppState;

#[derive(Deserialize)]
pub struct PaymentWebhookRequest {
    /// Provider event name, e.g. `charge.succeeded`.
    pub event: String,
    pub charge: Charge,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// POST /webhooks/payment — reconcile an asynchronous charge confirmation.
///
/// Reconciliation is authoritative and idempotent, so redeliveries are
/// always acknowledged with 200; anything else would make the provider
/// retry forever.
#[tracing::instrument(skip(state, req), fields(event = %req.event))]
pub async fn payment<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PaymentWebhookRequest>,
) -> Result<Json<WebhookAck>, ApiError> {
    if req.event != "charge.succeeded" {
        tracing::debug!("ignoring unhandled webhook event");
        return Ok(Json(WebhookAck { received: true }));
    }

    state.engine.reconcile_payment_success(req.charge).await?;
    Ok(Json(WebhookAck { received: true }))
}
