//! Discount Code Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{format_dollars, round_cents, text_enum, PromoCode};

text_enum! {
    /// How `discount_value` is interpreted.
    DiscountType {
        Percentage => "percentage",
        FixedAmount => "fixed_amount",
        FreeShipping => "free_shipping",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_order_amount: Decimal,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a code cannot be applied to an order.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountRejection {
    #[error("Discount code not found")]
    NotFound,
    #[error("Discount code is no longer active")]
    Inactive,
    #[error("Discount code is not valid yet")]
    NotYetValid,
    #[error("Discount code has expired")]
    Expired,
    #[error("Discount code usage limit reached")]
    UsageLimitReached,
    #[error("Order must be at least ${} to use this code", format_dollars(*.minimum))]
    BelowMinimum { minimum: Decimal },
}

impl DiscountRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::UsageLimitReached => "usage_limit_reached",
            Self::BelowMinimum { .. } => "below_minimum",
        }
    }
}

impl DiscountCode {
    pub fn create(
        code: PromoCode,
        discount_type: DiscountType,
        discount_value: Decimal,
        minimum_order_amount: Decimal,
        usage_limit: Option<i32>,
        valid_from: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), code: code.into_inner(), description: None, discount_type, discount_value,
            minimum_order_amount, usage_limit, usage_count: 0, valid_from, valid_until, active: true,
            created_at: now, updated_at: now,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.usage_limit, Some(limit) if self.usage_count >= limit)
    }

    /// Checks eligibility at `now` and returns the discount for `order_amount`.
    pub fn check(&self, order_amount: Decimal, now: DateTime<Utc>) -> Result<Decimal, DiscountRejection> {
        if !self.active { return Err(DiscountRejection::Inactive); }
        if now < self.valid_from { return Err(DiscountRejection::NotYetValid); }
        if matches!(self.valid_until, Some(until) if now > until) { return Err(DiscountRejection::Expired); }
        if self.is_exhausted() { return Err(DiscountRejection::UsageLimitReached); }
        if order_amount < self.minimum_order_amount {
            return Err(DiscountRejection::BelowMinimum { minimum: self.minimum_order_amount });
        }
        Ok(self.amount_for(order_amount))
    }

    /// Discount on `order_amount`, never more than the amount itself.
    pub fn amount_for(&self, order_amount: Decimal) -> Decimal {
        let order_amount = order_amount.max(Decimal::ZERO);
        let raw = match self.discount_type {
            DiscountType::Percentage => order_amount * self.discount_value / Decimal::ONE_HUNDRED,
            DiscountType::FixedAmount => self.discount_value,
            DiscountType::FreeShipping => Decimal::ZERO,
        };
        round_cents(raw.min(order_amount).max(Decimal::ZERO))
    }

    pub fn display(&self) -> String { format_discount_display(self.discount_type, self.discount_value) }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Customer-facing label: `"10% off"`, `"$5 off"`, `"$5.50 off"`, `"Free shipping"`.
pub fn format_discount_display(discount_type: DiscountType, value: Decimal) -> String {
    match discount_type {
        DiscountType::Percentage => format!("{}% off", value.normalize()),
        DiscountType::FixedAmount if value.fract().is_zero() => format!("${} off", value.trunc()),
        DiscountType::FixedAmount => format!("${} off", format_dollars(value)),
        DiscountType::FreeShipping => "Free shipping".to_string(),
    }
}

/// One redemption of a code by an order. Never updated after insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountUsage {
    pub id: Uuid,
    pub discount_code_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Option<String>,
    pub guest_email: Option<String>,
    pub discount_amount: Decimal,
    pub used_at: DateTime<Utc>,
}

impl DiscountUsage {
    pub fn new(discount_code_id: Uuid, order_id: Uuid, user_id: Option<String>, guest_email: Option<String>, discount_amount: Decimal) -> Self {
        Self { id: Uuid::now_v7(), discount_code_id, order_id, user_id, guest_email, discount_amount, used_at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(kind: DiscountType, value: i64) -> DiscountCode {
        DiscountCode::create(PromoCode::new("TEST").unwrap(), kind, Decimal::new(value, 0), Decimal::ZERO, None, Utc::now() - Duration::days(1), None)
    }

    #[test]
    fn test_percentage_amount() {
        let c = code(DiscountType::Percentage, 10);
        assert_eq!(c.check(Decimal::new(8999, 2), Utc::now()).unwrap(), Decimal::new(900, 2));
    }

    #[test]
    fn test_fixed_amount_capped_at_order() {
        let c = code(DiscountType::FixedAmount, 25);
        assert_eq!(c.amount_for(Decimal::new(20, 0)), Decimal::new(20, 0));
        assert_eq!(c.amount_for(Decimal::new(100, 0)), Decimal::new(25, 0));
    }

    #[test]
    fn test_usage_limit_reached() {
        let mut c = code(DiscountType::Percentage, 10);
        c.usage_limit = Some(3);
        c.usage_count = 2;
        assert!(c.check(Decimal::new(50, 0), Utc::now()).is_ok());
        c.usage_count = 3;
        assert_eq!(c.check(Decimal::new(50, 0), Utc::now()), Err(DiscountRejection::UsageLimitReached));
    }

    #[test]
    fn test_below_minimum() {
        let mut c = code(DiscountType::FixedAmount, 5);
        c.minimum_order_amount = Decimal::new(50, 0);
        let err = c.check(Decimal::new(4999, 2), Utc::now()).unwrap_err();
        assert_eq!(err, DiscountRejection::BelowMinimum { minimum: Decimal::new(50, 0) });
        assert_eq!(err.to_string(), "Order must be at least $50.00 to use this code");
    }

    #[test]
    fn test_validity_window() {
        let mut c = code(DiscountType::Percentage, 10);
        let now = Utc::now();
        c.valid_from = now + Duration::hours(1);
        assert_eq!(c.check(Decimal::new(10, 0), now), Err(DiscountRejection::NotYetValid));
        c.valid_from = now - Duration::days(2);
        c.valid_until = Some(now - Duration::days(1));
        assert_eq!(c.check(Decimal::new(10, 0), now), Err(DiscountRejection::Expired));
        c.active = false;
        assert_eq!(c.check(Decimal::new(10, 0), now), Err(DiscountRejection::Inactive));
    }

    #[test]
    fn test_format_discount_display() {
        assert_eq!(format_discount_display(DiscountType::Percentage, Decimal::new(10, 0)), "10% off");
        assert_eq!(format_discount_display(DiscountType::FixedAmount, Decimal::new(5, 0)), "$5 off");
        assert_eq!(format_discount_display(DiscountType::FixedAmount, Decimal::new(500, 2)), "$5 off");
        assert_eq!(format_discount_display(DiscountType::FixedAmount, Decimal::new(55, 1)), "$5.50 off");
        assert_eq!(format_discount_display(DiscountType::Percentage, Decimal::new(125, 1)), "12.5% off");
        assert_eq!(format_discount_display(DiscountType::FreeShipping, Decimal::ZERO), "Free shipping");
    }
}
