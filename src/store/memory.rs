//! In-process store with the same semantics as the Postgres one.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CreditStore, DiscountStore, OrderStore, ReviewStore};
use crate::domain::aggregates::{CreditKind, CreditTransaction, DiscountCode, DiscountUsage, Order, OrderItem, Review};
use crate::{Result, ServiceError};

#[derive(Default)]
pub struct MemoryStore {
    discounts: RwLock<HashMap<Uuid, DiscountCode>>,
    usages: RwLock<Vec<DiscountUsage>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    items: RwLock<Vec<OrderItem>>,
    credits: RwLock<CreditLedger>,
    reviews: RwLock<HashMap<Uuid, Review>>,
}

#[derive(Default)]
struct CreditLedger {
    balances: HashMap<String, Decimal>,
    entries: Vec<CreditTransaction>,
}

impl CreditLedger {
    fn post(&mut self, entry: &CreditTransaction) -> Result<Decimal> {
        let current = self.balances.get(&entry.user_id).copied().unwrap_or(Decimal::ZERO);
        let next = current + entry.amount;
        if next.is_sign_negative() && !next.is_zero() {
            return Err(ServiceError::invalid(format!("Insufficient credit balance (available {current})")));
        }
        self.balances.insert(entry.user_id.clone(), next);
        self.entries.push(entry.clone());
        Ok(next)
    }

    fn refunded(&self, user_id: &str, order_id: Option<Uuid>) -> bool {
        self.entries.iter().any(|e| e.kind == CreditKind::Refunded && e.user_id == user_id && e.order_id == order_id)
    }
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, Uuid)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl DiscountStore for MemoryStore {
    async fn list_discounts(&self) -> Result<Vec<DiscountCode>> {
        let mut all: Vec<_> = self.discounts.read().await.values().cloned().collect();
        newest_first(&mut all, |d| (d.created_at, d.id));
        Ok(all)
    }

    async fn find_discount(&self, id: Uuid) -> Result<Option<DiscountCode>> {
        Ok(self.discounts.read().await.get(&id).cloned())
    }

    async fn find_discount_by_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        Ok(self.discounts.read().await.values().find(|d| d.code.eq_ignore_ascii_case(code)).cloned())
    }

    async fn insert_discount(&self, discount: &DiscountCode) -> Result<()> {
        let mut discounts = self.discounts.write().await;
        if discounts.values().any(|d| d.code.eq_ignore_ascii_case(&discount.code)) {
            return Err(ServiceError::invalid("Discount code already exists"));
        }
        discounts.insert(discount.id, discount.clone());
        Ok(())
    }

    async fn update_discount(&self, discount: &DiscountCode) -> Result<()> {
        let mut discounts = self.discounts.write().await;
        if discounts.values().any(|d| d.id != discount.id && d.code.eq_ignore_ascii_case(&discount.code)) {
            return Err(ServiceError::invalid("Discount code already exists"));
        }
        match discounts.get_mut(&discount.id) {
            Some(existing) => { *existing = discount.clone(); Ok(()) }
            None => Err(ServiceError::not_found(format!("discount {}", discount.id))),
        }
    }

    async fn delete_discount(&self, id: Uuid) -> Result<bool> {
        Ok(self.discounts.write().await.remove(&id).is_some())
    }

    async fn record_usage(&self, usage: &DiscountUsage) -> Result<()> {
        let mut discounts = self.discounts.write().await;
        let discount = discounts
            .get_mut(&usage.discount_code_id)
            .ok_or_else(|| ServiceError::not_found(format!("discount {}", usage.discount_code_id)))?;
        if discount.usage_limit.is_some_and(|limit| discount.usage_count >= limit) {
            return Err(ServiceError::invalid("Discount code usage limit reached"));
        }
        discount.usage_count += 1;
        self.usages.write().await.push(usage.clone());
        Ok(())
    }

    async fn usage_for(&self, discount_id: Uuid) -> Result<Vec<DiscountUsage>> {
        let mut usages: Vec<_> = self.usages.read().await.iter().filter(|u| u.discount_code_id == discount_id).cloned().collect();
        newest_first(&mut usages, |u| (u.used_at, u.id));
        Ok(usages)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<bool> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(ServiceError::invalid("duplicate record"));
        }
        if orders.values().any(|o| o.order_number == order.order_number) {
            return Ok(false);
        }
        let mut stored = order.clone();
        stored.events.clear();
        orders.insert(order.id, stored);
        self.items.write().await.extend_from_slice(items);
        Ok(true)
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                existing.events.clear();
                Ok(())
            }
            None => Err(ServiceError::not_found(format!("order {}", order.id))),
        }
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.values().find(|o| o.tracking_number.as_deref() == Some(tracking_number)).cloned())
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> Result<(Vec<Order>, i64)> {
        let mut all: Vec<_> = self.orders.read().await.values().cloned().collect();
        newest_first(&mut all, |o| (o.created_at, o.id));
        let total = all.len() as i64;
        let page = all.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect();
        Ok((page, total))
    }

    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self.orders.read().await.values().filter(|o| o.user_id.as_deref() == Some(user_id)).cloned().collect();
        newest_first(&mut orders, |o| (o.created_at, o.id));
        Ok(orders)
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(self.items.read().await.iter().filter(|i| i.order_id == order_id).cloned().collect())
    }
}

#[async_trait]
impl CreditStore for MemoryStore {
    async fn balance(&self, user_id: &str) -> Result<Decimal> {
        Ok(self.credits.read().await.balances.get(user_id).copied().unwrap_or(Decimal::ZERO))
    }

    async fn history(&self, user_id: &str) -> Result<Vec<CreditTransaction>> {
        let mut entries: Vec<_> = self.credits.read().await.entries.iter().filter(|e| e.user_id == user_id).cloned().collect();
        newest_first(&mut entries, |e| (e.created_at, e.id));
        Ok(entries)
    }

    async fn apply(&self, entry: &CreditTransaction) -> Result<Decimal> {
        self.credits.write().await.post(entry)
    }

    async fn apply_refund(&self, entry: &CreditTransaction) -> Result<Option<Decimal>> {
        let mut ledger = self.credits.write().await;
        if ledger.refunded(&entry.user_id, entry.order_id) { return Ok(None); }
        ledger.post(entry).map(Some)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_review(&self, review: &Review) -> Result<()> {
        self.reviews.write().await.insert(review.id, review.clone());
        Ok(())
    }

    async fn approved_reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        let mut reviews: Vec<_> = self.reviews.read().await.values().filter(|r| r.approved && r.product_id == product_id).cloned().collect();
        newest_first(&mut reviews, |r| (r.created_at, r.id));
        Ok(reviews)
    }

    async fn all_reviews(&self) -> Result<Vec<Review>> {
        let mut reviews: Vec<_> = self.reviews.read().await.values().cloned().collect();
        newest_first(&mut reviews, |r| (r.created_at, r.id));
        Ok(reviews)
    }

    async fn set_review_approved(&self, id: Uuid, approved: bool) -> Result<bool> {
        Ok(self.reviews.write().await.get_mut(&id).map(|r| r.approved = approved).is_some())
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool> {
        Ok(self.reviews.write().await.remove(&id).is_some())
    }
}
