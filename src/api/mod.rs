//! JSON HTTP surface.

use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::bus::EventBus;
use crate::checkout::CheckoutService;
use crate::credits::CreditService;
use crate::discounts::DiscountService;
use crate::domain::aggregates::Address;
use crate::notify::{LogNotifier, Notifier};
use crate::orders::OrderService;
use crate::payments::{PaymentGateway, StripeWebhookHandler};
use crate::pricing::PriceTable;
use crate::reviews::ReviewService;
use crate::shipping::{ShippingGateway, ShippingService};
use crate::store::Stores;

mod accounts;
mod catalog;
mod discounts;
pub mod error;
mod orders;
mod shipping;
mod webhooks;

/// Everything the services are built from.
pub struct Dependencies {
    pub stores: Stores,
    pub bus: EventBus,
    pub notifier: Arc<dyn Notifier>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub shipping: Option<Arc<dyn ShippingGateway>>,
    pub price_table: PriceTable,
    pub stripe_webhook_secret: Option<String>,
    pub frontend_url: String,
    pub ship_from: Option<Address>,
    pub easypost_test_mode: bool,
}

impl Dependencies {
    /// Memory stores, no vendors, log notifications.
    pub fn in_memory() -> Self {
        Self {
            stores: Stores::memory(),
            bus: EventBus::disabled(),
            notifier: Arc::new(LogNotifier),
            payments: None,
            shipping: None,
            price_table: PriceTable::default(),
            stripe_webhook_secret: None,
            frontend_url: "http://localhost:3000".to_string(),
            ship_from: None,
            easypost_test_mode: false,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub discounts: Arc<DiscountService>,
    pub credits: Arc<CreditService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub reviews: Arc<ReviewService>,
    pub shipping: Arc<ShippingService>,
    pub stripe_webhooks: Arc<StripeWebhookHandler>,
    pub pricing: Arc<PriceTable>,
}

impl AppState {
    pub fn new(deps: Dependencies) -> Self {
        let Dependencies { stores, bus, notifier, payments, shipping, price_table, stripe_webhook_secret, frontend_url, ship_from, easypost_test_mode } = deps;
        let discounts = Arc::new(DiscountService::new(stores.discounts, bus.clone()));
        let credits = Arc::new(CreditService::new(stores.credits, notifier.clone(), bus.clone()));
        let orders = Arc::new(OrderService::new(stores.orders, notifier, bus));
        Self {
            checkout: Arc::new(CheckoutService::new(discounts.clone(), credits.clone(), orders.clone(), payments, frontend_url)),
            reviews: Arc::new(ReviewService::new(stores.reviews)),
            shipping: Arc::new(ShippingService::new(shipping, orders.clone(), ship_from, easypost_test_mode)),
            stripe_webhooks: Arc::new(StripeWebhookHandler::new(stripe_webhook_secret, orders.clone(), credits.clone())),
            pricing: Arc::new(price_table),
            discounts,
            credits,
            orders,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "printshop-commerce"})) }))
        .route("/", get(root))
        .route("/api/discounts/validate", post(discounts::validate))
        .route("/api/discounts", get(discounts::list).post(discounts::create))
        .route("/api/discounts/code/:code", get(discounts::by_code))
        .route("/api/discounts/:id", put(discounts::update).delete(discounts::delete))
        .route("/api/discounts/:id/usage", get(discounts::usage))
        .route("/api/checkout", post(orders::checkout))
        .route("/api/orders", get(orders::list))
        .route("/api/orders/:id", get(orders::get))
        .route("/api/orders/:id/items", get(orders::items))
        .route("/api/orders/:id/cancel", post(orders::cancel))
        .route("/api/orders/:id/tracking", post(orders::tracking))
        .route("/api/orders/:id/proofs", post(orders::add_proof))
        .route("/api/orders/:id/proofs/send", post(orders::send_proofs))
        .route("/api/orders/:id/proofs/:proof_id/approve", post(orders::approve_proof))
        .route("/api/orders/:id/proofs/:proof_id/request-changes", post(orders::request_changes))
        .route("/api/orders/:id/proofs/:proof_id/replace", post(orders::replace_proof))
        .route("/api/orders/:id/label", post(shipping::buy_label_for_order))
        .route("/api/users/:user_id/orders", get(accounts::orders))
        .route("/api/users/:user_id/credits", get(accounts::balance).post(accounts::grant))
        .route("/api/users/:user_id/credits/history", get(accounts::history))
        .route("/api/reviews", get(catalog::all_reviews).post(catalog::submit_review))
        .route("/api/reviews/:id", delete(catalog::delete_review))
        .route("/api/reviews/:id/approve", post(catalog::approve_review))
        .route("/api/products/:id/reviews", get(catalog::product_reviews))
        .route("/api/pricing/quote", post(catalog::quote))
        .route("/api/shipping/shipments", post(shipping::create_shipment))
        .route("/api/shipping/shipments/:id/buy", post(shipping::buy_label))
        .route("/api/shipping/track/:code", get(shipping::track))
        .route("/easypost/status", get(shipping::status))
        .route("/webhooks/stripe", post(webhooks::stripe))
        .route("/webhooks/easypost", post(webhooks::easypost))
        .route("/webhooks/test", post(webhooks::test))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "printshop-commerce",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "discounts": "/api/discounts",
            "checkout": "/api/checkout",
            "orders": "/api/orders",
            "reviews": "/api/reviews",
            "pricing": "/api/pricing/quote",
            "shipping": "/api/shipping/shipments",
            "webhooks": ["/webhooks/stripe", "/webhooks/easypost"]
        }
    }))
}
