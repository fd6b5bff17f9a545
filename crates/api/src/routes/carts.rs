//! Cart lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::{CartId, VisitorContext};
use serde::{Deserialize, Serialize};

use cart::{Address, Cart, CheckoutDraft, CheckoutPatch, FunnelStore, Money};
use checkout::{
    CheckoutEngine, FulfillmentRequest, InMemoryEmailSender, InMemoryPaymentProvider,
    InMemoryShippingEstimator,
};
use pipeline::EventRecorder;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: FunnelStore + Clone + 'static> {
    pub engine: CheckoutEngine<
        S,
        InMemoryPaymentProvider,
        InMemoryShippingEstimator,
        InMemoryEmailSender,
    >,
    pub store: S,
    pub recorder: EventRecorder,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCartRequest {
    pub handle: String,
    pub key: String,
    #[serde(default)]
    pub visitor: VisitorContext,
    pub email: Option<String>,
    pub ship_to: Option<Address>,
    pub chosen_price_cents: Option<i64>,
    #[serde(default)]
    pub bump_selected: bool,
    pub quantity: Option<u32>,
}

#[derive(Deserialize)]
pub struct UpdateCartRequest {
    pub email: Option<String>,
    pub ship_to: Option<Address>,
    pub chosen_price_cents: Option<i64>,
    pub bump_selected: Option<bool>,
    pub quantity: Option<u32>,
}

#[derive(Deserialize)]
pub struct BuyUpsellRequest {
    pub apparel_size: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelCartRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateFulfillmentRequest {
    pub product_ids: Vec<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub label_cost_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub id: String,
    pub stage: String,
    pub checkout_product_amount_cents: i64,
    pub checkout_shipping_and_handling_cents: i64,
    pub checkout_vat_amount_cents: i64,
    pub checkout_amount_cents: i64,
    pub order_amount_cents: i64,
    pub order_id: Option<i64>,
    pub shipping_unresolved: bool,
    pub canceled: bool,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            id: cart.id.to_string(),
            stage: cart.stage.to_string(),
            checkout_product_amount_cents: cart.checkout_product_amount.cents(),
            checkout_shipping_and_handling_cents: cart.checkout_shipping_and_handling().cents(),
            checkout_vat_amount_cents: cart.checkout_vat_amount.cents(),
            checkout_amount_cents: cart.checkout_amount.cents(),
            order_amount_cents: cart.order_amount.cents(),
            order_id: cart.order_id,
            shipping_unresolved: cart.shipping_unresolved,
            canceled: cart.canceled_at.is_some(),
        }
    }
}

#[derive(Serialize)]
pub struct CartCreatedResponse {
    pub cart: CartResponse,
    pub client_secret: String,
}

#[derive(Serialize)]
pub struct UpsellResponse {
    pub cart: CartResponse,
    pub redirect_handle: String,
    pub redirect_key: String,
    pub payment_status: String,
}

#[derive(Serialize)]
pub struct FulfillmentResponse {
    pub id: String,
    pub product_ids: Vec<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub cost_delta_cents: i64,
}

#[derive(Serialize)]
pub struct FulfillmentStatusResponse {
    pub fulfillments: Vec<FulfillmentResponse>,
    pub fully_fulfilled: bool,
}

// -- Handlers --

/// POST /carts — open a checkout attempt against a funnel route.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateCartRequest>,
) -> Result<(axum::http::StatusCode, Json<CartCreatedResponse>), ApiError> {
    let visitor = visitor_from(req.visitor, &headers);
    let draft = CheckoutDraft {
        email: req.email,
        ship_to: req.ship_to,
        chosen_price: req.chosen_price_cents.map(Money::from_cents),
        bump_selected: req.bump_selected,
        quantity: req.quantity,
    };

    let created = state
        .engine
        .create_cart(&req.handle, &req.key, visitor, draft)
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CartCreatedResponse {
            cart: CartResponse::from(&created.cart),
            client_secret: created.client_secret,
        }),
    ))
}

/// GET /carts/{id} — load a cart.
#[tracing::instrument(skip(state))]
pub async fn get<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let cart = state
        .store
        .get_cart(cart_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Cart {id} not found")))?;
    Ok(Json(CartResponse::from(&cart)))
}

/// PATCH /carts/{id} — apply a client-submitted checkout edit.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCartRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let patch = CheckoutPatch {
        email: req.email,
        ship_to: req.ship_to,
        chosen_price: req.chosen_price_cents.map(Money::from_cents),
        bump_selected: req.bump_selected,
        quantity: req.quantity,
    };

    let cart = state.engine.update_checkout(cart_id, patch).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /carts/{id}/upsell — buy the post-purchase upsell.
#[tracing::instrument(skip(state, req))]
pub async fn buy_upsell<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<BuyUpsellRequest>,
) -> Result<Json<UpsellResponse>, ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let outcome = state.engine.buy_upsell(cart_id, req.apparel_size).await?;

    Ok(Json(UpsellResponse {
        cart: CartResponse::from(&outcome.cart),
        redirect_handle: outcome.redirect_handle,
        redirect_key: outcome.redirect_key,
        payment_status: outcome.payment_status.to_string(),
    }))
}

/// POST /carts/{id}/upsell/decline — decline the upsell offer.
#[tracing::instrument(skip(state))]
pub async fn decline_upsell<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let cart = state.engine.decline_upsell(cart_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /carts/{id}/cancel — refund and cancel a converted cart.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelCartRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let reason = req.reason.as_deref().unwrap_or("requested_by_seller");
    let cart = state.engine.cancel_cart(cart_id, reason).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /carts/{id}/fulfillments — record a shipment.
#[tracing::instrument(skip(state, req))]
pub async fn create_fulfillment<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CreateFulfillmentRequest>,
) -> Result<(axum::http::StatusCode, Json<FulfillmentResponse>), ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let fulfillment = state
        .engine
        .create_fulfillment(
            cart_id,
            FulfillmentRequest {
                product_ids: req.product_ids,
                carrier: req.carrier,
                tracking_number: req.tracking_number,
                label_cost: Money::from_cents(req.label_cost_cents),
            },
        )
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(FulfillmentResponse {
            id: fulfillment.id.to_string(),
            cost_delta_cents: fulfillment.cost_delta().cents(),
            product_ids: fulfillment.product_ids,
            carrier: fulfillment.carrier,
            tracking_number: fulfillment.tracking_number,
        }),
    ))
}

/// GET /carts/{id}/fulfillments — shipments and derived completeness.
#[tracing::instrument(skip(state))]
pub async fn fulfillment_status<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<FulfillmentStatusResponse>, ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let (fulfillments, fully_fulfilled) = state.engine.fulfillment_status(cart_id).await?;

    Ok(Json(FulfillmentStatusResponse {
        fulfillments: fulfillments
            .into_iter()
            .map(|f| FulfillmentResponse {
                id: f.id.to_string(),
                cost_delta_cents: f.cost_delta().cents(),
                product_ids: f.product_ids,
                carrier: f.carrier,
                tracking_number: f.tracking_number,
            })
            .collect(),
        fully_fulfilled,
    }))
}

/// Fills transport-derived visitor fields the client did not supply.
pub fn visitor_from(mut visitor: VisitorContext, headers: &HeaderMap) -> VisitorContext {
    if visitor.ip.is_none() {
        visitor.ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());
    }
    if visitor.user_agent.is_none() {
        visitor.user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
    }
    visitor
}

pub fn parse_cart_id(id: &str) -> Result<CartId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid cart id: {e}")))?;
    Ok(CartId::from(uuid))
}
