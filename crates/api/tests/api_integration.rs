//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

use cart::{CartFunnel, FunnelStore, Money, Product, Workspace};
use common::{FunnelId, WorkspaceId};
use pipeline::UsageStore;
use store::InMemoryFunnelStore;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryFunnelStore,
    handles: api::CollaboratorHandles,
    workspace: Workspace,
}

async fn setup() -> TestApp {
    let store = InMemoryFunnelStore::new();
    let config = api::config::Config::default();
    let (state, handles) = api::create_default_state(store.clone(), &config);
    let app = api::create_app(state, get_metrics_handle());

    let mut workspace = Workspace::new(WorkspaceId::new(), "acme");
    workspace.payment_accounts.sandbox = Some("acct_sandbox".to_string());
    store.insert_workspace(workspace.clone()).await.unwrap();

    store
        .insert_funnel(CartFunnel {
            id: FunnelId::new(),
            workspace_id: workspace.id,
            handle: "acme".to_string(),
            key: "launch".to_string(),
            main_product: Product::new("SKU-MAIN", "Album", Money::from_cents(2000)),
            main_pay_what_you_want: None,
            bump_product: None,
            bump_price_override: None,
            upsell_product: None,
            upsell_price_override: None,
            handling_fee: Money::zero(),
            fee_percent_override: None,
        })
        .await
        .unwrap();

    TestApp {
        app,
        store,
        handles,
        workspace,
    }
}

async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn create_cart_body() -> serde_json::Value {
    serde_json::json!({
        "handle": "acme",
        "key": "launch",
        "email": "jane.doe@example.com",
        "visitor": { "ip": "203.0.113.7" }
    })
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let (status, json) = request_json(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_cart() {
    let t = setup().await;

    let (status, json) = request_json(&t.app, "POST", "/carts", Some(create_cart_body())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["cart"]["stage"], "checkoutCreated");
    assert_eq!(json["cart"]["checkout_amount_cents"], 2000);
    assert!(
        json["client_secret"]
            .as_str()
            .is_some_and(|s| !s.is_empty())
    );
}

#[tokio::test]
async fn test_create_cart_unknown_funnel() {
    let t = setup().await;

    let body = serde_json::json!({ "handle": "acme", "key": "missing" });
    let (status, _) = request_json(&t.app, "POST", "/carts", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_cart_roundtrip_and_bad_ids() {
    let t = setup().await;

    let (_, created) = request_json(&t.app, "POST", "/carts", Some(create_cart_body())).await;
    let id = created["cart"]["id"].as_str().unwrap();

    let (status, json) = request_json(&t.app, "GET", &format!("/carts/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stage"], "checkoutCreated");

    let (status, _) = request_json(
        &t.app,
        "GET",
        &format!("/carts/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request_json(&t.app, "GET", "/carts/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_converts_the_cart() {
    let t = setup().await;

    let (_, created) = request_json(&t.app, "POST", "/carts", Some(create_cart_body())).await;
    let id = created["cart"]["id"].as_str().unwrap().to_string();

    // Capture the intent the way the provider would, then deliver the hook.
    let cart_id = common::CartId::from(uuid::Uuid::parse_str(&id).unwrap());
    let cart = t.store.get_cart(cart_id).await.unwrap().unwrap();
    let charge = t
        .handles
        .payment
        .capture_intent(cart.payment_intent_id.as_deref().unwrap(), "jane.doe@example.com");

    let body = serde_json::json!({ "event": "charge.succeeded", "charge": charge });
    let (status, json) = request_json(&t.app, "POST", "/webhooks/payment", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);

    let (_, cart_json) = request_json(&t.app, "GET", &format!("/carts/{id}"), None).await;
    assert_eq!(cart_json["stage"], "checkoutConverted");
    assert_eq!(cart_json["order_id"], 1);
    assert_eq!(t.handles.email.receipts_for(cart_id), 1);

    // Redelivery acknowledges without side effects.
    let (status, _) = request_json(&t.app, "POST", "/webhooks/payment", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.handles.email.receipts_for(cart_id), 1);
}

#[tokio::test]
async fn test_update_cart_resizes_checkout() {
    let t = setup().await;

    let (_, created) = request_json(&t.app, "POST", "/carts", Some(create_cart_body())).await;
    let id = created["cart"]["id"].as_str().unwrap();

    let body = serde_json::json!({ "quantity": 2 });
    let (status, json) = request_json(&t.app, "PATCH", &format!("/carts/{id}"), Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["checkout_amount_cents"], 4000);
}

#[tokio::test]
async fn test_record_event_and_dedup() {
    let t = setup().await;

    let body = serde_json::json!({
        "workspace_id": t.workspace.id.as_uuid(),
        "asset_kind": "link",
        "asset_id": "l-1",
        "event_type": "linkClick",
        "visitor": { "ip": "203.0.113.7" }
    });

    let (status, json) = request_json(&t.app, "POST", "/events", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "recorded");

    let (status, json) = request_json(&t.app, "POST", "/events", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "skipped");
    assert_eq!(json["reason"], "duplicate");

    assert_eq!(t.handles.warehouse.row_count(), 1);
    assert_eq!(t.handles.usage.asset_count("link:l-1").await, 1);
}

#[tokio::test]
async fn test_record_event_unknown_workspace() {
    let t = setup().await;

    let body = serde_json::json!({
        "workspace_id": uuid::Uuid::new_v4(),
        "asset_kind": "link",
        "asset_id": "l-1",
        "event_type": "linkClick"
    });
    let (status, _) = request_json(&t.app, "POST", "/events", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;

    let (status, _) = request_json(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
