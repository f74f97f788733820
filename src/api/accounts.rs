use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::discounts::AmountInput;
use crate::domain::aggregates::{CreditTransaction, Order};
use crate::ServiceError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance { pub user_id: String, pub balance: Decimal }

#[derive(Debug, Deserialize)]
pub struct GrantRequest { pub amount: AmountInput, pub reason: String }

pub async fn orders(State(s): State<AppState>, Path(user_id): Path<String>) -> Result<Json<Vec<Order>>, ServiceError> {
    Ok(Json(s.orders.orders_for_user(&user_id).await?))
}

pub async fn balance(State(s): State<AppState>, Path(user_id): Path<String>) -> Result<Json<Balance>, ServiceError> {
    let balance = s.credits.balance(&user_id).await?;
    Ok(Json(Balance { user_id, balance }))
}

pub async fn history(State(s): State<AppState>, Path(user_id): Path<String>) -> Result<Json<Vec<CreditTransaction>>, ServiceError> {
    Ok(Json(s.credits.history(&user_id).await?))
}

pub async fn grant(State(s): State<AppState>, Path(user_id): Path<String>, Json(r): Json<GrantRequest>) -> Result<(StatusCode, Json<CreditTransaction>), ServiceError> {
    let amount = r.amount.parse()?;
    Ok((StatusCode::CREATED, Json(s.credits.grant(&user_id, amount, &r.reason).await?)))
}
