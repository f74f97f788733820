use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::discounts::{AmountInput, CreateDiscountInput, DiscountValidation, UpdateDiscountInput};
use crate::domain::aggregates::{DiscountCode, DiscountUsage};
use crate::ServiceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest { pub code: String, pub order_amount: AmountInput, pub user_id: Option<String>, pub guest_email: Option<String> }

pub async fn validate(State(s): State<AppState>, Json(r): Json<ValidateRequest>) -> Result<Json<DiscountValidation>, ServiceError> {
    let amount = r.order_amount.parse()?;
    Ok(Json(s.discounts.validate_code(&r.code, amount, r.user_id.as_deref(), r.guest_email.as_deref()).await?))
}

pub async fn list(State(s): State<AppState>) -> Result<Json<Vec<DiscountCode>>, ServiceError> {
    Ok(Json(s.discounts.get_all_discount_codes().await?))
}

pub async fn create(State(s): State<AppState>, Json(r): Json<CreateDiscountInput>) -> Result<(StatusCode, Json<DiscountCode>), ServiceError> {
    Ok((StatusCode::CREATED, Json(s.discounts.create_code(r).await?)))
}

pub async fn by_code(State(s): State<AppState>, Path(code): Path<String>) -> Result<Json<DiscountCode>, ServiceError> {
    Ok(Json(s.discounts.get_code(&code).await?))
}

pub async fn update(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<UpdateDiscountInput>) -> Result<Json<DiscountCode>, ServiceError> {
    Ok(Json(s.discounts.update_code(id, r).await?))
}

pub async fn delete(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ServiceError> {
    s.discounts.delete_code(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn usage(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<DiscountUsage>>, ServiceError> {
    Ok(Json(s.discounts.usage_for_code(id).await?))
}
