use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::Order;
use crate::shipping::{PurchasedLabel, Shipment, ShipmentRequest, ShippingStatus, TrackingInfo};
use crate::ServiceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyRequest { pub rate_id: String }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLabelRequest { pub shipment_id: String, pub rate_id: String }

#[derive(Debug, Deserialize)]
pub struct TrackParams { pub carrier: Option<String> }

pub async fn create_shipment(State(s): State<AppState>, Json(r): Json<ShipmentRequest>) -> Result<(StatusCode, Json<Shipment>), ServiceError> {
    Ok((StatusCode::CREATED, Json(s.shipping.create_shipment(r).await?)))
}

pub async fn buy_label(State(s): State<AppState>, Path(shipment_id): Path<String>, Json(r): Json<BuyRequest>) -> Result<Json<PurchasedLabel>, ServiceError> {
    Ok(Json(s.shipping.buy_label(&shipment_id, &r.rate_id).await?))
}

pub async fn buy_label_for_order(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<OrderLabelRequest>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(s.shipping.buy_label_for_order(id, &r.shipment_id, &r.rate_id).await?))
}

pub async fn track(State(s): State<AppState>, Path(code): Path<String>, Query(p): Query<TrackParams>) -> Result<Json<TrackingInfo>, ServiceError> {
    Ok(Json(s.shipping.track(&code, p.carrier.as_deref()).await?))
}

pub async fn status(State(s): State<AppState>) -> Json<ShippingStatus> {
    Json(s.shipping.status())
}
