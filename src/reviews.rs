//! Product reviews with moderation.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{NewReview, Review};
use crate::store::ReviewStore;
use crate::{Result, ServiceError};

pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self { Self { store } }

    pub async fn submit_review(&self, input: NewReview) -> Result<Review> {
        input.validate()?;
        if input.comment.trim().is_empty() { return Err(ServiceError::invalid("Comment is required")); }
        let review = Review::submit(input);
        self.store.insert_review(&review).await?;
        info!(review_id = %review.id, product_id = %review.product_id, rating = review.rating, "review submitted");
        Ok(review)
    }

    pub async fn reviews_for_product(&self, product_id: &str) -> Result<Vec<Review>> {
        self.store.approved_reviews(product_id).await
    }

    pub async fn all_reviews(&self) -> Result<Vec<Review>> { self.store.all_reviews().await }

    pub async fn approve_review(&self, id: Uuid) -> Result<()> {
        if !self.store.set_review_approved(id, true).await? {
            return Err(ServiceError::not_found(format!("review {id}")));
        }
        info!(review_id = %id, "review approved");
        Ok(())
    }

    pub async fn delete_review(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_review(id).await? {
            return Err(ServiceError::not_found(format!("review {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn input(rating: i16, comment: &str) -> NewReview {
        NewReview {
            product_id: "die-cut".into(), user_id: None, reviewer_name: "Sam".into(),
            rating, title: None, comment: comment.into(),
        }
    }

    #[tokio::test]
    async fn test_reviews_need_approval() {
        let svc = ReviewService::new(Arc::new(MemoryStore::new()));
        let review = svc.submit_review(input(5, "Great colors")).await.unwrap();
        assert!(!review.approved);
        assert!(svc.reviews_for_product("die-cut").await.unwrap().is_empty());

        svc.approve_review(review.id).await.unwrap();
        let visible = svc.reviews_for_product("die-cut").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(svc.all_reviews().await.unwrap().len(), 1);

        svc.delete_review(review.id).await.unwrap();
        assert!(matches!(svc.delete_review(review.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_reviews() {
        let svc = ReviewService::new(Arc::new(MemoryStore::new()));
        assert!(matches!(svc.submit_review(input(6, "too good")).await, Err(ServiceError::ValidationFailed(_))));
        assert!(matches!(svc.submit_review(input(4, "   ")).await, Err(ServiceError::ValidationFailed(_))));
        assert!(matches!(svc.approve_review(Uuid::nil()).await, Err(ServiceError::NotFound(_))));
    }
}
