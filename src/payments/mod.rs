//! Payments through Stripe Checkout.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::Order;
use crate::Result;

pub mod stripe;
pub mod webhook;

pub use stripe::StripeClient;
pub use webhook::{StripeWebhookHandler, WebhookOutcome};

/// Everything a hosted checkout page needs to charge one order.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: Decimal,
    pub customer_email: String,
    pub user_id: Option<String>,
    pub discount_code: Option<String>,
    pub credits_applied: Decimal,
    pub success_url: String,
    pub cancel_url: String,
}

impl SessionRequest {
    pub fn for_order(order: &Order, frontend_url: &str) -> Self {
        let base = frontend_url.trim_end_matches('/');
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount: order.total_price,
            customer_email: order.customer_email.clone(),
            user_id: order.user_id.clone(),
            discount_code: order.discount_code.clone(),
            credits_applied: order.credits_applied,
            success_url: format!("{base}/order-confirmation?session_id={{CHECKOUT_SESSION_ID}}&order_id={}", order.id),
            cancel_url: format!("{base}/cart"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession { pub id: String, pub url: String }

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &SessionRequest) -> Result<CheckoutSession>;
}
