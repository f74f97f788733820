//! Stripe webhook verification and dispatch.

use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::credits::CreditService;
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::format_dollars;
use crate::orders::OrderService;
use crate::{Result, ServiceError};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed payload, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing Stripe-Signature header")]
    MissingHeader,
    #[error("Signature header has no timestamp")]
    MissingTimestamp,
    #[error("Signature header has no v1 signature")]
    MissingSignature,
    #[error("Signature timestamp outside tolerance")]
    Expired,
    #[error("No signature matches the payload")]
    Mismatch,
}

impl From<SignatureError> for ServiceError {
    fn from(err: SignatureError) -> Self { ServiceError::ValidationFailed(err.to_string()) }
}

fn mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::invalid("Invalid webhook secret"))?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    Ok(mac)
}

/// Checks a `t=...,v1=...` header against the payload at time `now`.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.extend(hex::decode(v).ok()),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() { return Err(SignatureError::MissingSignature.into()); }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS { return Err(SignatureError::Expired.into()); }
    let expected = mac(secret, timestamp, payload)?;
    if signatures.iter().any(|sig| expected.clone().verify_slice(sig).is_ok()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch.into())
    }
}

/// Produces the header Stripe would send for `payload`.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let signature = mac(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData { object: serde_json::Value }

#[derive(Debug, Default, Deserialize)]
struct EventObject {
    id: Option<String>,
    payment_status: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

impl EventObject {
    fn order_id(&self) -> Option<Uuid> {
        self.metadata.get("order_id").or(self.client_reference_id.as_ref()).and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub received: bool,
    pub event_type: String,
    pub order_id: Option<Uuid>,
    pub action: &'static str,
}

pub struct StripeWebhookHandler {
    secret: Option<String>,
    orders: Arc<OrderService>,
    credits: Arc<CreditService>,
}

impl StripeWebhookHandler {
    pub fn new(secret: Option<String>, orders: Arc<OrderService>, credits: Arc<CreditService>) -> Self {
        Self { secret, orders, credits }
    }

    /// Verifies and applies one event. Unknown event types are acknowledged.
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let secret = self.secret.as_deref().ok_or(ServiceError::NotConfigured("Stripe webhook secret"))?;
        let header = signature.ok_or(SignatureError::MissingHeader)?;
        verify_signature(payload, header, secret, Utc::now().timestamp())?;

        let event: StripeEvent = serde_json::from_slice(payload).map_err(|e| ServiceError::invalid(format!("Invalid event payload: {e}")))?;
        let object: EventObject = serde_json::from_value(event.data.object).unwrap_or_default();
        let order_id = object.order_id();
        let action = match (event.kind.as_str(), order_id) {
            ("checkout.session.completed", Some(id)) => self.session_completed(id, &object).await?,
            ("checkout.session.expired", Some(id)) => self.session_expired(id).await?,
            ("payment_intent.payment_failed", Some(id)) => self.payment_failed(id).await?,
            (kind, None) if kind.starts_with("checkout.session.") || kind == "payment_intent.payment_failed" => {
                warn!(event_type = %kind, "stripe event without order id");
                "ignored"
            }
            (kind, _) => {
                info!(event_type = %kind, "unhandled stripe event");
                "ignored"
            }
        };
        Ok(WebhookOutcome { received: true, event_type: event.kind, order_id, action })
    }

    async fn session_completed(&self, order_id: Uuid, object: &EventObject) -> Result<&'static str> {
        if !matches!(object.payment_status.as_deref(), Some("paid" | "no_payment_required")) {
            info!(order_id = %order_id, payment_status = ?object.payment_status, "checkout completed without payment");
            return Ok("awaiting_payment");
        }
        let mut order = self.orders.get_order(order_id).await?;
        if order.is_paid() { return Ok("already_paid"); }
        order.mark_paid(object.id.clone())?;
        self.orders.persist(&mut order).await?;
        info!(order_id = %order_id, order_number = %order.order_number, "order paid");
        let message = format!("💳 Payment received for order #{}: ${} from {}", order.order_number, format_dollars(order.total_price), order.customer_email);
        let _ = self.orders.notify(&message).await;
        Ok("marked_paid")
    }

    async fn session_expired(&self, order_id: Uuid) -> Result<&'static str> {
        let mut order = self.orders.get_order(order_id).await?;
        if order.is_paid() { return Ok("already_paid"); }
        if order.order_status == OrderStatus::Cancelled { return Ok("already_cancelled"); }
        order.cancel()?;
        // The refund is recorded once per order, so redeliveries after a failed save are safe.
        if let (Some(user_id), true) = (order.user_id.clone(), order.credits_applied > Decimal::ZERO) {
            self.credits.refund_for_order(&user_id, order.id, order.credits_applied).await?;
            order.drop_credits();
        }
        self.orders.persist(&mut order).await?;
        info!(order_id = %order_id, "checkout session expired, order cancelled");
        Ok("cancelled")
    }

    async fn payment_failed(&self, order_id: Uuid) -> Result<&'static str> {
        let mut order = self.orders.get_order(order_id).await?;
        order.mark_payment_failed();
        self.orders.persist(&mut order).await?;
        warn!(order_id = %order_id, "payment failed");
        Ok("marked_failed")
    }
}
