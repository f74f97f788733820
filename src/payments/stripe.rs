use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

use super::{CheckoutSession, PaymentGateway, SessionRequest};
use crate::domain::value_objects::{format_dollars, to_cents};
use crate::{Result, ServiceError};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

#[derive(Deserialize)] struct SessionBody { id: String, url: Option<String> }
#[derive(Deserialize)] struct ApiError { error: ApiErrorBody }
#[derive(Deserialize)] struct ApiErrorBody { message: String }

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;
        Ok(Self { client, secret_key: secret_key.into(), base_url: DEFAULT_BASE_URL.to_string() })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Form fields for `POST /v1/checkout/sessions`.
    fn session_form(request: &SessionRequest) -> Result<Vec<(&'static str, String)>> {
        let cents = to_cents(request.amount)
            .filter(|c| *c > 0)
            .ok_or_else(|| ServiceError::invalid(format!("Cannot charge ${}", format_dollars(request.amount))))?;
        let order_id = request.order_id.to_string();
        Ok(vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price_data][currency]", "usd".to_string()),
            ("line_items[0][price_data][product_data][name]", format!("Order #{}", request.order_number)),
            ("line_items[0][price_data][unit_amount]", cents.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("customer_email", request.customer_email.clone()),
            ("client_reference_id", order_id.clone()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("metadata[order_id]", order_id.clone()),
            ("metadata[order_number]", request.order_number.clone()),
            ("metadata[user_id]", request.user_id.clone().unwrap_or_default()),
            ("metadata[discount_code]", request.discount_code.clone().unwrap_or_default()),
            ("metadata[credits_applied]", format_dollars(request.credits_applied)),
            ("payment_intent_data[metadata][order_id]", order_id),
        ])
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(&self, request: &SessionRequest) -> Result<CheckoutSession> {
        let form = Self::session_form(request)?;
        let response = self.client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body).map(|e| e.error.message).unwrap_or_else(|_| status.to_string());
            error!(order_id = %request.order_id, status = %status, message = %message, "stripe session creation failed");
            return Err(ServiceError::UpstreamFailure(format!("Stripe: {message}")));
        }
        let session: SessionBody = serde_json::from_str(&body)
            .map_err(|e| ServiceError::UpstreamFailure(format!("Stripe returned malformed JSON: {e}")))?;
        let url = session.url.ok_or_else(|| ServiceError::UpstreamFailure("Stripe session has no URL".into()))?;
        info!(order_id = %request.order_id, session_id = %session.id, "stripe checkout session created");
        Ok(CheckoutSession { id: session.id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn request(amount: Decimal) -> SessionRequest {
        SessionRequest {
            order_id: Uuid::nil(), order_number: "PS-1001".into(), amount, customer_email: "a@b.co".into(),
            user_id: None, discount_code: Some("SAVE20".into()), credits_applied: Decimal::new(50, 0),
            success_url: "http://localhost:3000/ok".into(), cancel_url: "http://localhost:3000/cart".into(),
        }
    }

    #[test]
    fn test_session_form_in_cents() {
        let form = StripeClient::session_form(&request(Decimal::new(3050, 2))).unwrap();
        let get = |k: &str| form.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("3050"));
        assert_eq!(get("metadata[discount_code]"), Some("SAVE20"));
        assert_eq!(get("metadata[credits_applied]"), Some("50.00"));
        assert_eq!(get("metadata[user_id]"), Some(""));
    }

    #[test]
    fn test_zero_amount_rejected() {
        assert!(StripeClient::session_form(&request(Decimal::ZERO)).is_err());
    }
}
