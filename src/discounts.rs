//! Discount code management and validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::bus::EventBus;
use crate::domain::aggregates::{DiscountCode, DiscountRejection, DiscountType, DiscountUsage};
use crate::domain::events::{DiscountEvent, DomainEvent};
use crate::domain::value_objects::{parse_amount, PromoCode};
use crate::store::DiscountStore;
use crate::{Result, ServiceError};

/// Result of checking a code against an order amount.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountValidation {
    pub valid: bool,
    pub discount_code: Option<DiscountCode>,
    pub discount_amount: Decimal,
    pub message: String,
    /// Machine-readable rejection, absent when valid.
    pub reason: Option<&'static str>,
}

impl DiscountValidation {
    fn accepted(code: DiscountCode, amount: Decimal) -> Self {
        let message = format!("{} applied", code.display());
        Self { valid: true, discount_code: Some(code), discount_amount: amount, message, reason: None }
    }

    fn rejected(rejection: DiscountRejection) -> Self {
        Self { valid: false, discount_code: None, discount_amount: Decimal::ZERO, message: rejection.to_string(), reason: Some(rejection.reason()) }
    }
}

/// Amounts arrive as JSON numbers or as admin-typed strings like `"$5.00"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput { Number(Decimal), Text(String) }

impl AmountInput {
    pub fn parse(&self) -> Result<Decimal> {
        match self {
            Self::Number(n) if n.is_sign_negative() => Err(ServiceError::invalid("Amount must not be negative")),
            Self::Number(n) => Ok(*n),
            Self::Text(t) => Ok(parse_amount(t)?),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiscountInput {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: AmountInput,
    pub minimum_order_amount: Option<AmountInput>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDiscountInput {
    #[validate(length(min = 1, max = 32))]
    pub code: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<AmountInput>,
    pub minimum_order_amount: Option<AmountInput>,
    /// `Some(None)` clears the limit.
    #[serde(default, with = "double_option")]
    pub usage_limit: Option<Option<i32>>,
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, with = "double_option")]
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

pub struct DiscountService {
    store: Arc<dyn DiscountStore>,
    bus: EventBus,
}

impl DiscountService {
    pub fn new(store: Arc<dyn DiscountStore>, bus: EventBus) -> Self { Self { store, bus } }

    /// Checks a code for an order. Ineligible codes come back as
    /// `valid: false` with a reason; store failures are errors.
    #[instrument(skip(self))]
    pub async fn validate_code(&self, code: &str, order_amount: Decimal, user_id: Option<&str>, guest_email: Option<&str>) -> Result<DiscountValidation> {
        let Ok(normalized) = PromoCode::new(code) else {
            return Ok(DiscountValidation::rejected(DiscountRejection::NotFound));
        };
        let Some(discount) = self.store.find_discount_by_code(normalized.as_str()).await? else {
            return Ok(DiscountValidation::rejected(DiscountRejection::NotFound));
        };
        let validation = match discount.check(order_amount, Utc::now()) {
            Ok(amount) => DiscountValidation::accepted(discount, amount),
            Err(rejection) => {
                info!(reason = rejection.reason(), user_id = ?user_id, guest_email = ?guest_email, "discount code rejected");
                DiscountValidation::rejected(rejection)
            }
        };
        Ok(validation)
    }

    pub async fn create_code(&self, input: CreateDiscountInput) -> Result<DiscountCode> {
        input.validate()?;
        let code = PromoCode::new(&input.code)?;
        let value = input.discount_value.parse()?;
        check_value(input.discount_type, value)?;
        let minimum = input.minimum_order_amount.as_ref().map(AmountInput::parse).transpose()?.unwrap_or(Decimal::ZERO);
        let valid_from = input.valid_from.unwrap_or_else(Utc::now);
        check_window(valid_from, input.valid_until)?;

        let mut discount = DiscountCode::create(code, input.discount_type, value, minimum, input.usage_limit, valid_from, input.valid_until);
        discount.description = input.description;
        discount.active = input.active.unwrap_or(true);
        self.store.insert_discount(&discount).await?;
        info!(code = %discount.code, id = %discount.id, "discount code created");
        Ok(discount)
    }

    pub async fn update_code(&self, id: Uuid, patch: UpdateDiscountInput) -> Result<DiscountCode> {
        patch.validate()?;
        let mut discount = self.get_by_id(id).await?;
        if let Some(code) = &patch.code { discount.code = PromoCode::new(code)?.into_inner(); }
        if let Some(description) = patch.description { discount.description = Some(description); }
        if let Some(kind) = patch.discount_type { discount.discount_type = kind; }
        if let Some(value) = &patch.discount_value { discount.discount_value = value.parse()?; }
        if let Some(minimum) = &patch.minimum_order_amount { discount.minimum_order_amount = minimum.parse()?; }
        if let Some(limit) = patch.usage_limit {
            if matches!(limit, Some(l) if l < 1) { return Err(ServiceError::invalid("Usage limit must be at least 1")); }
            discount.usage_limit = limit;
        }
        if let Some(from) = patch.valid_from { discount.valid_from = from; }
        if let Some(until) = patch.valid_until { discount.valid_until = until; }
        if let Some(active) = patch.active { discount.active = active; }
        check_value(discount.discount_type, discount.discount_value)?;
        check_window(discount.valid_from, discount.valid_until)?;
        discount.touch();
        self.store.update_discount(&discount).await?;
        info!(code = %discount.code, id = %discount.id, "discount code updated");
        Ok(discount)
    }

    pub async fn delete_code(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_discount(id).await? {
            return Err(ServiceError::not_found(format!("discount {id}")));
        }
        info!(id = %id, "discount code deleted");
        Ok(())
    }

    pub async fn get_all_discount_codes(&self) -> Result<Vec<DiscountCode>> { self.store.list_discounts().await }

    pub async fn get_code(&self, code: &str) -> Result<DiscountCode> {
        let normalized = PromoCode::new(code)?;
        self.store.find_discount_by_code(normalized.as_str()).await?
            .ok_or_else(|| ServiceError::not_found(format!("discount code {normalized}")))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<DiscountCode> {
        self.store.find_discount(id).await?.ok_or_else(|| ServiceError::not_found(format!("discount {id}")))
    }

    pub async fn record_usage(&self, discount: &DiscountCode, order_id: Uuid, user_id: Option<String>, guest_email: Option<String>, amount: Decimal) -> Result<DiscountUsage> {
        let usage = DiscountUsage::new(discount.id, order_id, user_id, guest_email, amount);
        self.store.record_usage(&usage).await.inspect_err(|e| warn!(code = %discount.code, order_id = %order_id, error = %e, "failed to record discount usage"))?;
        self.bus.publish_all(vec![DomainEvent::Discount(DiscountEvent::Redeemed { code: discount.code.clone(), order_id, amount })]).await;
        Ok(usage)
    }

    pub async fn usage_for_code(&self, id: Uuid) -> Result<Vec<DiscountUsage>> {
        self.get_by_id(id).await?;
        self.store.usage_for(id).await
    }
}

fn check_value(kind: DiscountType, value: Decimal) -> Result<()> {
    if kind == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::invalid("Percentage discounts cannot exceed 100"));
    }
    if kind != DiscountType::FreeShipping && value.is_zero() {
        return Err(ServiceError::invalid("Discount value must be greater than zero"));
    }
    Ok(())
}

fn check_window(from: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Result<()> {
    match until {
        Some(until) if until < from => Err(ServiceError::invalid("Discount must end after it starts")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn service() -> DiscountService { DiscountService::new(Arc::new(MemoryStore::new()), EventBus::disabled()) }

    fn input(value: serde_json::Value) -> CreateDiscountInput { serde_json::from_value(value).unwrap() }

    #[tokio::test]
    async fn test_create_normalizes_code_and_amounts() {
        let svc = service();
        let created = svc.create_code(input(json!({
            "code": " spring10 ", "discountType": "fixed_amount", "discountValue": "$5.50", "minimumOrderAmount": "25"
        }))).await.unwrap();
        assert_eq!(created.code, "SPRING10");
        assert_eq!(created.discount_value, Decimal::new(550, 2));
        assert_eq!(created.minimum_order_amount, Decimal::new(25, 0));
        assert_eq!(svc.get_code("Spring10").await.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let svc = service();
        svc.create_code(input(json!({ "code": "DUP", "discountType": "percentage", "discountValue": 10 }))).await.unwrap();
        let err = svc.create_code(input(json!({ "code": "dup", "discountType": "percentage", "discountValue": 15 }))).await.unwrap_err();
        assert_eq!(err.to_string(), "Discount code already exists");
    }

    #[tokio::test]
    async fn test_validate_code_reasons() {
        let svc = service();
        svc.create_code(input(json!({
            "code": "BIG", "discountType": "percentage", "discountValue": 10, "minimumOrderAmount": 50, "usageLimit": 1
        }))).await.unwrap();

        let missing = svc.validate_code("NOPE", Decimal::new(100, 0), None, None).await.unwrap();
        assert!(!missing.valid);
        assert_eq!(missing.reason, Some("not_found"));

        let below = svc.validate_code("big", Decimal::new(40, 0), None, None).await.unwrap();
        assert!(!below.valid);
        assert_eq!(below.reason, Some("below_minimum"));

        let ok = svc.validate_code("big", Decimal::new(80, 0), Some("u1"), None).await.unwrap();
        assert!(ok.valid);
        assert_eq!(ok.discount_amount, Decimal::new(8, 0));
        assert_eq!(ok.message, "10% off applied");

        let code = ok.discount_code.unwrap();
        svc.record_usage(&code, Uuid::now_v7(), Some("u1".into()), None, Decimal::new(8, 0)).await.unwrap();
        let exhausted = svc.validate_code("BIG", Decimal::new(80, 0), None, None).await.unwrap();
        assert_eq!(exhausted.reason, Some("usage_limit_reached"));
        let over = svc.record_usage(&code, Uuid::now_v7(), Some("u2".into()), None, Decimal::new(8, 0)).await;
        assert!(matches!(over, Err(ServiceError::ValidationFailed(_))));
        assert_eq!(svc.usage_for_code(code.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let svc = service();
        let created = svc.create_code(input(json!({ "code": "EDIT", "discountType": "percentage", "discountValue": 10, "usageLimit": 5 }))).await.unwrap();
        let patch: UpdateDiscountInput = serde_json::from_value(json!({ "discountValue": "15", "usageLimit": null, "active": false })).unwrap();
        let updated = svc.update_code(created.id, patch).await.unwrap();
        assert_eq!(updated.discount_value, Decimal::new(15, 0));
        assert_eq!(updated.usage_limit, None);
        assert!(!updated.active);

        let bad: UpdateDiscountInput = serde_json::from_value(json!({ "discountValue": 150 })).unwrap();
        assert!(matches!(svc.update_code(created.id, bad).await, Err(ServiceError::ValidationFailed(_))));

        svc.delete_code(created.id).await.unwrap();
        assert!(matches!(svc.delete_code(created.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_all_is_idempotent() {
        let svc = service();
        for code in ["A1", "B2", "C3"] {
            svc.create_code(input(json!({ "code": code, "discountType": "free_shipping", "discountValue": 0 }))).await.unwrap();
        }
        let first = svc.get_all_discount_codes().await.unwrap();
        let second = svc.get_all_discount_codes().await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }
}
