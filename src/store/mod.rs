//! Persistence seams.
//!
//! Services depend on these traits only. [`PgStore`] backs production and
//! [`MemoryStore`] backs tests and database-less development runs.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{CreditTransaction, DiscountCode, DiscountUsage, Order, OrderItem, Review};
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait DiscountStore: Send + Sync {
    /// Newest first, ties broken by id.
    async fn list_discounts(&self) -> Result<Vec<DiscountCode>>;
    async fn find_discount(&self, id: Uuid) -> Result<Option<DiscountCode>>;
    /// Case-insensitive.
    async fn find_discount_by_code(&self, code: &str) -> Result<Option<DiscountCode>>;
    /// Fails with `ValidationFailed` when the code already exists.
    async fn insert_discount(&self, discount: &DiscountCode) -> Result<()>;
    async fn update_discount(&self, discount: &DiscountCode) -> Result<()>;
    async fn delete_discount(&self, id: Uuid) -> Result<bool>;
    /// Inserts the usage row and increments the code's usage count. Fails
    /// with `ValidationFailed` once the count has reached the usage limit.
    async fn record_usage(&self, usage: &DiscountUsage) -> Result<()>;
    async fn usage_for(&self, discount_id: Uuid) -> Result<Vec<DiscountUsage>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order and its items together, or neither. Returns `false`
    /// without inserting when the order number is already taken.
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<bool>;
    async fn save_order(&self, order: &Order) -> Result<()>;
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>>;
    /// Newest first, with the total count.
    async fn list_orders(&self, limit: i64, offset: i64) -> Result<(Vec<Order>, i64)>;
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>>;
    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>>;
}

#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn balance(&self, user_id: &str) -> Result<Decimal>;
    /// Newest first.
    async fn history(&self, user_id: &str) -> Result<Vec<CreditTransaction>>;
    /// Appends the entry and moves the balance atomically; returns the new
    /// balance. A debit larger than the balance fails with `ValidationFailed`.
    async fn apply(&self, entry: &CreditTransaction) -> Result<Decimal>;
    /// Like [`apply`](Self::apply) for a refund entry, but at most once per
    /// user and order. Returns `None` when the order was already refunded.
    async fn apply_refund(&self, entry: &CreditTransaction) -> Result<Option<Decimal>>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert_review(&self, review: &Review) -> Result<()>;
    /// Approved reviews for one product, newest first.
    async fn approved_reviews(&self, product_id: &str) -> Result<Vec<Review>>;
    async fn all_reviews(&self) -> Result<Vec<Review>>;
    async fn set_review_approved(&self, id: Uuid, approved: bool) -> Result<bool>;
    async fn delete_review(&self, id: Uuid) -> Result<bool>;
}

/// One handle per store seam, all usually backed by the same object.
#[derive(Clone)]
pub struct Stores {
    pub discounts: Arc<dyn DiscountStore>,
    pub orders: Arc<dyn OrderStore>,
    pub credits: Arc<dyn CreditStore>,
    pub reviews: Arc<dyn ReviewStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_backend(Arc::new(PgStore::new(pool)))
    }

    fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: DiscountStore + OrderStore + CreditStore + ReviewStore + 'static,
    {
        Self { discounts: backend.clone(), orders: backend.clone(), credits: backend.clone(), reviews: backend }
    }
}
