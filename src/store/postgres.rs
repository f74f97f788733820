//! Postgres-backed store.
//!
//! Each table has one row struct and one conversion into the domain type;
//! column naming never leaks past this module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use super::{CreditStore, DiscountStore, OrderStore, ReviewStore};
use crate::domain::aggregates::{
    Address, CreditKind, CreditTransaction, DiscountCode, DiscountUsage, Order, OrderItem, Proof, Review,
};
use crate::domain::value_objects::UnknownVariant;
use crate::{Result, ServiceError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn parse_text<T: FromStr<Err = UnknownVariant>>(value: &str) -> Result<T> {
    value.parse().map_err(|e: UnknownVariant| ServiceError::UpstreamFailure(format!("corrupt row: {e}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().and_then(|e| e.code()).as_deref() == Some("23505")
}

/// Order item quantities are stored as `INTEGER`.
fn item_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| ServiceError::invalid(format!("Quantity {quantity} is too large")))
}

fn order_number_taken(err: &sqlx::Error) -> bool {
    is_unique_violation(err)
        && err.as_database_error().and_then(|e| e.constraint()) == Some("orders_main_order_number_key")
}

fn duplicate_code(err: sqlx::Error) -> ServiceError {
    if is_unique_violation(&err) { ServiceError::invalid("Discount code already exists") } else { err.into() }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct DiscountRow {
    id: Uuid,
    code: String,
    description: Option<String>,
    discount_type: String,
    discount_value: Decimal,
    minimum_order_amount: Decimal,
    usage_limit: Option<i32>,
    usage_count: i32,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DiscountRow> for DiscountCode {
    type Error = ServiceError;
    fn try_from(r: DiscountRow) -> Result<Self> {
        Ok(Self {
            id: r.id, code: r.code, description: r.description, discount_type: parse_text(&r.discount_type)?,
            discount_value: r.discount_value, minimum_order_amount: r.minimum_order_amount, usage_limit: r.usage_limit,
            usage_count: r.usage_count, valid_from: r.valid_from, valid_until: r.valid_until, active: r.active,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    id: Uuid,
    discount_code_id: Uuid,
    order_id: Uuid,
    user_id: Option<String>,
    guest_email: Option<String>,
    discount_amount: Decimal,
    used_at: DateTime<Utc>,
}

impl From<UsageRow> for DiscountUsage {
    fn from(r: UsageRow) -> Self {
        Self { id: r.id, discount_code_id: r.discount_code_id, order_id: r.order_id, user_id: r.user_id, guest_email: r.guest_email, discount_amount: r.discount_amount, used_at: r.used_at }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<String>,
    customer_email: String,
    financial_status: String,
    fulfillment_status: String,
    order_status: String,
    proof_status: String,
    subtotal: Decimal,
    discount_code: Option<String>,
    discount_amount: Decimal,
    credits_applied: Decimal,
    total_price: Decimal,
    shipping_address: Option<Json<Address>>,
    proofs: Json<Vec<Proof>>,
    tracking_number: Option<String>,
    tracking_company: Option<String>,
    tracking_url: Option<String>,
    tracking_status: Option<String>,
    stripe_session_id: Option<String>,
    shipment_id: Option<String>,
    label_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = ServiceError;
    fn try_from(r: OrderRow) -> Result<Self> {
        Ok(Self {
            id: r.id, order_number: r.order_number, user_id: r.user_id, customer_email: r.customer_email,
            financial_status: parse_text(&r.financial_status)?, fulfillment_status: parse_text(&r.fulfillment_status)?,
            order_status: parse_text(&r.order_status)?, proof_status: parse_text(&r.proof_status)?,
            subtotal: r.subtotal, discount_code: r.discount_code, discount_amount: r.discount_amount,
            credits_applied: r.credits_applied, total_price: r.total_price,
            shipping_address: r.shipping_address.map(|a| a.0), proofs: r.proofs.0,
            tracking_number: r.tracking_number, tracking_company: r.tracking_company, tracking_url: r.tracking_url,
            tracking_status: r.tracking_status, stripe_session_id: r.stripe_session_id, shipment_id: r.shipment_id,
            label_url: r.label_url, created_at: r.created_at, updated_at: r.updated_at, events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: String,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    calculator_selections: serde_json::Value,
    custom_files: Json<Vec<String>>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        Self {
            id: r.id, order_id: r.order_id, product_id: r.product_id, product_name: r.product_name,
            quantity: r.quantity.max(0) as u32, unit_price: r.unit_price, total_price: r.total_price,
            calculator_selections: r.calculator_selections, custom_files: r.custom_files.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CreditRow {
    id: Uuid,
    user_id: String,
    amount: Decimal,
    kind: String,
    order_id: Option<Uuid>,
    reason: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CreditRow> for CreditTransaction {
    type Error = ServiceError;
    fn try_from(r: CreditRow) -> Result<Self> {
        Ok(Self { id: r.id, user_id: r.user_id, amount: r.amount, kind: parse_text(&r.kind)?, order_id: r.order_id, reason: r.reason, created_at: r.created_at })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    product_id: String,
    user_id: Option<String>,
    reviewer_name: String,
    rating: i16,
    title: Option<String>,
    comment: String,
    approved: bool,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(r: ReviewRow) -> Self {
        Self { id: r.id, product_id: r.product_id, user_id: r.user_id, reviewer_name: r.reviewer_name, rating: r.rating, title: r.title, comment: r.comment, approved: r.approved, created_at: r.created_at }
    }
}

// =============================================================================
// Discounts
// =============================================================================

#[async_trait]
impl DiscountStore for PgStore {
    async fn list_discounts(&self) -> Result<Vec<DiscountCode>> {
        sqlx::query_as::<_, DiscountRow>("SELECT * FROM discount_codes ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool).await?
            .into_iter().map(DiscountCode::try_from).collect()
    }

    async fn find_discount(&self, id: Uuid) -> Result<Option<DiscountCode>> {
        sqlx::query_as::<_, DiscountRow>("SELECT * FROM discount_codes WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(DiscountCode::try_from).transpose()
    }

    async fn find_discount_by_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        sqlx::query_as::<_, DiscountRow>("SELECT * FROM discount_codes WHERE UPPER(code) = UPPER($1)")
            .bind(code).fetch_optional(&self.pool).await?
            .map(DiscountCode::try_from).transpose()
    }

    async fn insert_discount(&self, d: &DiscountCode) -> Result<()> {
        sqlx::query("INSERT INTO discount_codes (id, code, description, discount_type, discount_value, minimum_order_amount, usage_limit, usage_count, valid_from, valid_until, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)")
            .bind(d.id).bind(&d.code).bind(&d.description).bind(d.discount_type.as_str()).bind(d.discount_value)
            .bind(d.minimum_order_amount).bind(d.usage_limit).bind(d.usage_count).bind(d.valid_from).bind(d.valid_until)
            .bind(d.active).bind(d.created_at).bind(d.updated_at)
            .execute(&self.pool).await.map_err(duplicate_code)?;
        Ok(())
    }

    async fn update_discount(&self, d: &DiscountCode) -> Result<()> {
        let result = sqlx::query("UPDATE discount_codes SET code = $2, description = $3, discount_type = $4, discount_value = $5, minimum_order_amount = $6, usage_limit = $7, valid_from = $8, valid_until = $9, active = $10, updated_at = $11 WHERE id = $1")
            .bind(d.id).bind(&d.code).bind(&d.description).bind(d.discount_type.as_str()).bind(d.discount_value)
            .bind(d.minimum_order_amount).bind(d.usage_limit).bind(d.valid_from).bind(d.valid_until).bind(d.active).bind(d.updated_at)
            .execute(&self.pool).await.map_err(duplicate_code)?;
        if result.rows_affected() == 0 { return Err(ServiceError::not_found(format!("discount {}", d.id))); }
        Ok(())
    }

    async fn delete_discount(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM discount_codes WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_usage(&self, u: &DiscountUsage) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query("UPDATE discount_codes SET usage_count = usage_count + 1, updated_at = NOW() WHERE id = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)")
            .bind(u.discount_code_id).execute(&mut *tx).await?;
        if claimed.rows_affected() == 0 {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM discount_codes WHERE id = $1")
                .bind(u.discount_code_id).fetch_optional(&mut *tx).await?;
            return Err(match exists {
                Some(_) => ServiceError::invalid("Discount code usage limit reached"),
                None => ServiceError::not_found(format!("discount {}", u.discount_code_id)),
            });
        }
        sqlx::query("INSERT INTO discount_usage (id, discount_code_id, order_id, user_id, guest_email, discount_amount, used_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(u.id).bind(u.discount_code_id).bind(u.order_id).bind(&u.user_id).bind(&u.guest_email).bind(u.discount_amount).bind(u.used_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn usage_for(&self, discount_id: Uuid) -> Result<Vec<DiscountUsage>> {
        let rows = sqlx::query_as::<_, UsageRow>("SELECT * FROM discount_usage WHERE discount_code_id = $1 ORDER BY used_at DESC, id DESC")
            .bind(discount_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(DiscountUsage::from).collect())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, o: &Order, items: &[OrderItem]) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query("INSERT INTO orders_main (id, order_number, user_id, customer_email, financial_status, fulfillment_status, order_status, proof_status, subtotal, discount_code, discount_amount, credits_applied, total_price, shipping_address, proofs, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)")
            .bind(o.id).bind(&o.order_number).bind(&o.user_id).bind(&o.customer_email)
            .bind(o.financial_status.as_str()).bind(o.fulfillment_status.as_str()).bind(o.order_status.as_str()).bind(o.proof_status.as_str())
            .bind(o.subtotal).bind(&o.discount_code).bind(o.discount_amount).bind(o.credits_applied).bind(o.total_price)
            .bind(o.shipping_address.as_ref().map(Json)).bind(Json(&o.proofs)).bind(o.created_at).bind(o.updated_at)
            .execute(&mut *tx).await;
        match inserted {
            Err(err) if order_number_taken(&err) => return Ok(false),
            other => { other?; }
        }
        for item in items {
            let quantity = item_quantity(item.quantity)?;
            sqlx::query("INSERT INTO order_items_new (id, order_id, product_id, product_name, quantity, unit_price, total_price, calculator_selections, custom_files) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
                .bind(item.id).bind(item.order_id).bind(&item.product_id).bind(&item.product_name)
                .bind(quantity).bind(item.unit_price).bind(item.total_price)
                .bind(&item.calculator_selections).bind(Json(&item.custom_files))
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn save_order(&self, o: &Order) -> Result<()> {
        let result = sqlx::query("UPDATE orders_main SET financial_status = $2, fulfillment_status = $3, order_status = $4, proof_status = $5, discount_amount = $6, credits_applied = $7, total_price = $8, shipping_address = $9, proofs = $10, tracking_number = $11, tracking_company = $12, tracking_url = $13, tracking_status = $14, stripe_session_id = $15, shipment_id = $16, label_url = $17, updated_at = $18, discount_code = $19 WHERE id = $1")
            .bind(o.id).bind(o.financial_status.as_str()).bind(o.fulfillment_status.as_str()).bind(o.order_status.as_str()).bind(o.proof_status.as_str())
            .bind(o.discount_amount).bind(o.credits_applied).bind(o.total_price).bind(o.shipping_address.as_ref().map(Json)).bind(Json(&o.proofs))
            .bind(&o.tracking_number).bind(&o.tracking_company).bind(&o.tracking_url).bind(&o.tracking_status)
            .bind(&o.stripe_session_id).bind(&o.shipment_id).bind(&o.label_url).bind(o.updated_at).bind(&o.discount_code)
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(ServiceError::not_found(format!("order {}", o.id))); }
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders_main WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders_main WHERE tracking_number = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(tracking_number).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> Result<(Vec<Order>, i64)> {
        let orders = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders_main ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2")
            .bind(limit).bind(offset).fetch_all(&self.pool).await?
            .into_iter().map(Order::try_from).collect::<Result<Vec<_>>>()?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders_main").fetch_one(&self.pool).await?;
        Ok((orders, total.0))
    }

    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders_main WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(user_id).fetch_all(&self.pool).await?
            .into_iter().map(Order::try_from).collect()
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items_new WHERE order_id = $1 ORDER BY id")
            .bind(order_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }
}

// =============================================================================
// Credits
// =============================================================================

#[async_trait]
impl CreditStore for PgStore {
    async fn balance(&self, user_id: &str) -> Result<Decimal> {
        let row: Option<(Decimal,)> = sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = $1")
            .bind(user_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.0).unwrap_or(Decimal::ZERO))
    }

    async fn history(&self, user_id: &str) -> Result<Vec<CreditTransaction>> {
        sqlx::query_as::<_, CreditRow>("SELECT * FROM credit_transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(user_id).fetch_all(&self.pool).await?
            .into_iter().map(CreditTransaction::try_from).collect()
    }

    async fn apply(&self, e: &CreditTransaction) -> Result<Decimal> {
        let mut tx = self.pool.begin().await?;
        let current = lock_balance(&mut tx, &e.user_id).await?;
        let next = post_credit(&mut tx, e, current).await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn apply_refund(&self, e: &CreditTransaction) -> Result<Option<Decimal>> {
        let mut tx = self.pool.begin().await?;
        let current = lock_balance(&mut tx, &e.user_id).await?;
        let (refunded,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM credit_transactions WHERE user_id = $1 AND order_id = $2 AND kind = $3)")
            .bind(&e.user_id).bind(e.order_id).bind(CreditKind::Refunded.as_str()).fetch_one(&mut *tx).await?;
        if refunded { return Ok(None); }
        let next = post_credit(&mut tx, e, current).await?;
        tx.commit().await?;
        Ok(Some(next))
    }
}

/// Creates the balance row if needed and locks it for the transaction.
async fn lock_balance(conn: &mut sqlx::PgConnection, user_id: &str) -> Result<Decimal> {
    sqlx::query("INSERT INTO user_credits (user_id, balance) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id).execute(&mut *conn).await?;
    let (current,): (Decimal,) = sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = $1 FOR UPDATE")
        .bind(user_id).fetch_one(&mut *conn).await?;
    Ok(current)
}

async fn post_credit(conn: &mut sqlx::PgConnection, e: &CreditTransaction, current: Decimal) -> Result<Decimal> {
    let next = current + e.amount;
    if next < Decimal::ZERO {
        return Err(ServiceError::invalid(format!("Insufficient credit balance (available {current})")));
    }
    sqlx::query("UPDATE user_credits SET balance = $2, updated_at = NOW() WHERE user_id = $1")
        .bind(&e.user_id).bind(next).execute(&mut *conn).await?;
    sqlx::query("INSERT INTO credit_transactions (id, user_id, amount, kind, order_id, reason, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
        .bind(e.id).bind(&e.user_id).bind(e.amount).bind(e.kind.as_str()).bind(e.order_id).bind(&e.reason).bind(e.created_at)
        .execute(&mut *conn).await?;
    Ok(next)
}

// =============================================================================
// Reviews
// =============================================================================

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert_review(&self, r: &Review) -> Result<()> {
        sqlx::query("INSERT INTO reviews (id, product_id, user_id, reviewer_name, rating, title, comment, approved, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(r.id).bind(&r.product_id).bind(&r.user_id).bind(&r.reviewer_name).bind(r.rating).bind(&r.title).bind(&r.comment).bind(r.approved).bind(r.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn approved_reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE product_id = $1 AND approved ORDER BY created_at DESC")
            .bind(product_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn all_reviews(&self) -> Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn set_review_approved(&self, id: Uuid, approved: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE reviews SET approved = $2 WHERE id = $1").bind(id).bind(approved).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
