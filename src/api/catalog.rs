use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{NewReview, Review};
use crate::pricing::{Quote, QuoteRequest};
use crate::ServiceError;

pub async fn all_reviews(State(s): State<AppState>) -> Result<Json<Vec<Review>>, ServiceError> {
    Ok(Json(s.reviews.all_reviews().await?))
}

pub async fn submit_review(State(s): State<AppState>, Json(r): Json<NewReview>) -> Result<(StatusCode, Json<Review>), ServiceError> {
    Ok((StatusCode::CREATED, Json(s.reviews.submit_review(r).await?)))
}

pub async fn product_reviews(State(s): State<AppState>, Path(product_id): Path<String>) -> Result<Json<Vec<Review>>, ServiceError> {
    Ok(Json(s.reviews.reviews_for_product(&product_id).await?))
}

pub async fn approve_review(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ServiceError> {
    s.reviews.approve_review(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_review(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ServiceError> {
    s.reviews.delete_review(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn quote(State(s): State<AppState>, Json(r): Json<QuoteRequest>) -> Result<Json<Quote>, ServiceError> {
    Ok(Json(s.pricing.quote(&r)?))
}
