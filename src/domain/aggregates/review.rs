//! Product reviews

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub product_id: String,
    pub user_id: Option<String>,
    pub reviewer_name: String,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    #[validate(length(min = 1))]
    pub product_id: String,
    pub user_id: Option<String>,
    #[validate(length(min = 1, max = 80))]
    pub reviewer_name: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub comment: String,
}

impl Review {
    /// New reviews wait for moderation.
    pub fn submit(input: NewReview) -> Self {
        Self {
            id: Uuid::now_v7(), product_id: input.product_id, user_id: input.user_id,
            reviewer_name: input.reviewer_name.trim().to_string(), rating: input.rating,
            title: input.title, comment: input.comment.trim().to_string(), approved: false, created_at: Utc::now(),
        }
    }
}
