//! HTTP API server for the checkout funnel.
//!
//! Provides REST endpoints for cart lifecycle, the payment webhook and
//! shared event recording, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cart::FunnelStore;
use checkout::{
    CheckoutConfig, CheckoutEngine, InMemoryEmailSender, InMemoryPaymentProvider,
    InMemoryShippingEstimator,
};
use pipeline::{
    EventRecorder, InMemoryAdSink, InMemoryDedupGate, InMemoryEndpointDirectory,
    InMemoryUsageStore, InMemoryWarehouseSink,
};

use config::Config;
use routes::carts::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: FunnelStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/carts", post(routes::carts::create::<S>))
        .route(
            "/carts/{id}",
            get(routes::carts::get::<S>).patch(routes::carts::update::<S>),
        )
        .route("/carts/{id}/upsell", post(routes::carts::buy_upsell::<S>))
        .route(
            "/carts/{id}/upsell/decline",
            post(routes::carts::decline_upsell::<S>),
        )
        .route("/carts/{id}/cancel", post(routes::carts::cancel::<S>))
        .route(
            "/carts/{id}/fulfillments",
            post(routes::carts::create_fulfillment::<S>)
                .get(routes::carts::fulfillment_status::<S>),
        )
        .route("/webhooks/payment", post(routes::webhooks::payment::<S>))
        .route("/events", post(routes::events::record::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Handles onto the in-memory collaborators, for tests and the sandbox
/// server to drive captures and inspect side effects.
#[derive(Clone)]
pub struct CollaboratorHandles {
    pub payment: InMemoryPaymentProvider,
    pub shipping: InMemoryShippingEstimator,
    pub email: InMemoryEmailSender,
    pub warehouse: InMemoryWarehouseSink,
    pub ads: InMemoryAdSink,
    pub endpoints: InMemoryEndpointDirectory,
    pub usage: InMemoryUsageStore,
}

/// Creates application state over the given store with in-memory
/// collaborator doubles.
pub fn create_default_state<S: FunnelStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> (Arc<AppState<S>>, CollaboratorHandles) {
    let payment = InMemoryPaymentProvider::new();
    let shipping = InMemoryShippingEstimator::new();
    let email = InMemoryEmailSender::new();
    let warehouse = InMemoryWarehouseSink::new();
    let ads = InMemoryAdSink::new();
    let endpoints = InMemoryEndpointDirectory::new();
    let usage = InMemoryUsageStore::new();

    let recorder = EventRecorder::new(
        Arc::new(InMemoryDedupGate::new(config.rate_window)),
        Arc::new(usage.clone()),
        Arc::new(endpoints.clone()),
        Arc::new(ads.clone()),
        Arc::new(warehouse.clone()),
    );

    let engine_config = CheckoutConfig {
        environment: config.environment,
        abandon_delay: config.abandon_delay,
        ..CheckoutConfig::default()
    };

    let engine = CheckoutEngine::new(
        store.clone(),
        payment.clone(),
        shipping.clone(),
        email.clone(),
        recorder.clone(),
        engine_config,
    );

    let state = Arc::new(AppState {
        engine,
        store,
        recorder,
    });

    let handles = CollaboratorHandles {
        payment,
        shipping,
        email,
        warehouse,
        ads,
        endpoints,
        usage,
    };

    (state, handles)
}
