use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::checkout::{CheckoutOutcome, CheckoutRequest};
use crate::domain::aggregates::{Order, OrderItem};
use crate::orders::{ListParams, PaginatedResponse};
use crate::ServiceError;

pub async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<CheckoutOutcome>), ServiceError> {
    let outcome = s.checkout.checkout(r).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Order>>, ServiceError> {
    Ok(Json(s.orders.list_orders(&p).await?))
}

pub async fn get(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.orders.get_order(id).await?))
}

pub async fn items(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<OrderItem>>, ServiceError> {
    Ok(Json(s.orders.order_items(id).await?))
}

pub async fn cancel(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.orders.cancel_order(id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest { pub tracking_number: String, pub tracking_company: String, pub tracking_url: Option<String> }

pub async fn tracking(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<TrackingRequest>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.orders.update_tracking(id, &r.tracking_number, &r.tracking_company, r.tracking_url).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest { pub proof_url: String, pub notes: Option<String> }

pub async fn add_proof(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<ProofRequest>) -> Result<(StatusCode, Json<Order>), ServiceError> {
    Ok((StatusCode::CREATED, Json(s.orders.add_proof(id, &r.proof_url, r.notes).await?)))
}

pub async fn send_proofs(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.orders.send_proofs(id).await?))
}

pub async fn approve_proof(State(s): State<AppState>, Path((id, proof_id)): Path<(Uuid, Uuid)>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.orders.approve_proof(id, proof_id).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesRequest { pub customer_notes: Option<String> }

pub async fn request_changes(State(s): State<AppState>, Path((id, proof_id)): Path<(Uuid, Uuid)>, Json(r): Json<ChangesRequest>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.orders.request_proof_changes(id, proof_id, r.customer_notes).await?))
}

pub async fn replace_proof(State(s): State<AppState>, Path((id, proof_id)): Path<(Uuid, Uuid)>, Json(r): Json<ProofRequest>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.orders.replace_proof(id, proof_id, &r.proof_url).await?))
}
