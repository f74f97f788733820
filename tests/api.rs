use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

use printshop_commerce::api::{router, AppState, Dependencies};
use printshop_commerce::payments::webhook::signature_header;
use printshop_commerce::payments::{CheckoutSession, PaymentGateway, SessionRequest};

const WEBHOOK_SECRET: &str = "whsec_api_test";

struct AcceptingPayments;

#[async_trait]
impl PaymentGateway for AcceptingPayments {
    async fn create_checkout_session(&self, request: &SessionRequest) -> printshop_commerce::Result<CheckoutSession> {
        Ok(CheckoutSession { id: format!("cs_{}", request.order_number), url: "https://checkout.stripe.test/session".into() })
    }
}

fn app(deps: Dependencies) -> Router {
    router(AppState::new(deps))
}

fn with_payments() -> Router {
    app(Dependencies {
        payments: Some(Arc::new(AcceptingPayments)),
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..Dependencies::in_memory()
    })
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn decimal(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn test_health_and_root() {
    let app = app(Dependencies::in_memory());
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    let (status, body) = call(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["checkout"], "/api/checkout");
}

#[tokio::test]
async fn test_discount_lifecycle() {
    let app = app(Dependencies::in_memory());
    let create = json!({"code": "save10", "discountType": "percentage", "discountValue": "10"});
    let (status, created) = call(&app, "POST", "/api/discounts", Some(create.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["code"], "SAVE10");

    let (status, body) = call(&app, "POST", "/api/discounts", Some(create)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_failed");

    let (status, found) = call(&app, "GET", "/api/discounts/code/save10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], created["id"]);

    let (status, validation) = call(&app, "POST", "/api/discounts/validate", Some(json!({"code": "SAVE10", "orderAmount": 50}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validation["valid"], true);
    assert_eq!(decimal(&validation["discountAmount"]), Decimal::new(5, 0));

    let (_, unknown) = call(&app, "POST", "/api/discounts/validate", Some(json!({"code": "NOPE", "orderAmount": 50}))).await;
    assert_eq!(unknown["valid"], false);

    let id = created["id"].as_str().unwrap();
    let (status, _) = call(&app, "DELETE", &format!("/api/discounts/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &format!("/api/discounts/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_then_paid_webhook() {
    let app = with_payments();
    let checkout = json!({
        "items": [{"productId": "die-cut", "productName": "Die-cut stickers", "quantity": 2, "unitPrice": "12.50"}],
        "email": "guest@example.com"
    });
    let (status, outcome) = call(&app, "POST", "/api/checkout", Some(checkout)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outcome["success"], true);
    assert_eq!(decimal(&outcome["total"]), Decimal::new(25, 0));
    let order_id = outcome["orderId"].as_str().unwrap().to_string();

    let event = json!({"type": "checkout.session.completed", "data": {"object": {
        "id": "cs_paid", "payment_status": "paid", "metadata": {"order_id": order_id}
    }}});
    let payload = event.to_string();
    let header = signature_header(payload.as_bytes(), WEBHOOK_SECRET, chrono::Utc::now().timestamp()).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("stripe-signature", header)
        .body(Body::from(payload))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, order) = call(&app, "GET", &format!("/api/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["financialStatus"], "paid");
    assert_eq!(order["orderStatus"], "Creating Proofs");

    let (_, items) = call(&app, "GET", &format!("/api/orders/{order_id}/items"), None).await;
    assert_eq!(items.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_webhook_rejections() {
    let unconfigured = app(Dependencies::in_memory());
    let (status, _) = call(&unconfigured, "POST", "/webhooks/stripe", Some(json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let app = with_payments();
    let req = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/webhooks/easypost", Some(json!({"result": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call(&app, "POST", "/webhooks/easypost", Some(json!({
        "description": "tracker.updated", "result": {"tracking_code": "UNKNOWN", "status": "in_transit"}
    }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderId"], Value::Null);
}

#[tokio::test]
async fn test_unconfigured_shipping() {
    let app = app(Dependencies::in_memory());
    let (status, body) = call(&app, "GET", "/easypost/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], false);

    let (status, body) = call(&app, "GET", "/api/shipping/track/1Z999", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "not_configured");
}

#[tokio::test]
async fn test_orders_credits_reviews_and_quotes() {
    let app = app(Dependencies::in_memory());
    let (status, body) = call(&app, "GET", "/api/orders/00000000-0000-0000-0000-000000000000", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = call(&app, "POST", "/api/users/user-9/credits", Some(json!({"amount": "$15", "reason": "referral"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, balance) = call(&app, "GET", "/api/users/user-9/credits", None).await;
    assert_eq!(decimal(&balance["balance"]), Decimal::new(15, 0));

    let review = json!({"productId": "die-cut", "reviewerName": "Sam", "rating": 5, "comment": "Crisp print"});
    let (status, created) = call(&app, "POST", "/api/reviews", Some(review)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, visible) = call(&app, "GET", "/api/products/die-cut/reviews", None).await;
    assert_eq!(visible.as_array().map(Vec::len), Some(0));
    let id = created["id"].as_str().unwrap();
    let (status, _) = call(&app, "POST", &format!("/api/reviews/{id}/approve"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, visible) = call(&app, "GET", "/api/products/die-cut/reviews", None).await;
    assert_eq!(visible.as_array().map(Vec::len), Some(1));

    let (status, quote) = call(&app, "POST", "/api/pricing/quote", Some(json!({"width": 3, "height": 3, "quantity": 100, "rush": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(decimal(&quote["rushFee"]) > Decimal::ZERO);
    let (status, _) = call(&app, "POST", "/api/pricing/quote", Some(json!({"width": 3, "height": 3, "quantity": 0}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let huge = json!({"width": 1_000_000_000_000_000_u64, "height": 1_000_000_000_000_000_u64, "quantity": 1});
    let (status, body) = call(&app, "POST", "/api/pricing/quote", Some(huge)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_failed");
}
