use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::info;

use super::error::webhook_rejection;
use super::AppState;
use crate::ServiceError;

pub async fn stripe(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());
    match s.stripe_webhooks.handle(&body, signature).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => webhook_rejection(e),
    }
}

pub async fn easypost(State(s): State<AppState>, body: Bytes) -> Response {
    let payload = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) if payload.is_object() => payload,
        _ => return webhook_rejection(ServiceError::invalid("Invalid webhook payload")),
    };
    match s.shipping.process_tracker_webhook(payload).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => webhook_rejection(e),
    }
}

/// Echo endpoint for checking webhook delivery from a vendor dashboard.
pub async fn test(headers: HeaderMap, body: Bytes) -> Json<serde_json::Value> {
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)));
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("none");
    info!(content_type = %content_type, bytes = body.len(), "test webhook received");
    Json(json!({ "received": true, "contentType": content_type, "payload": payload }))
}
