//! Store credit ledger entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{round_cents, text_enum};

text_enum! {
    CreditKind {
        Earned => "earned",
        Redeemed => "redeemed",
        Refunded => "refunded",
        Adjustment => "adjustment",
    }
}

/// Signed ledger entry: positive amounts credit the account, negative debit it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: String,
    pub amount: Decimal,
    pub kind: CreditKind,
    pub order_id: Option<Uuid>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn grant(user_id: impl Into<String>, amount: Decimal, reason: impl Into<String>) -> Self {
        Self::new(user_id, amount.abs(), CreditKind::Earned, None, reason)
    }

    pub fn redeem(user_id: impl Into<String>, order_id: Uuid, amount: Decimal) -> Self {
        Self::new(user_id, -amount.abs(), CreditKind::Redeemed, Some(order_id), format!("Applied to order {}", order_id))
    }

    pub fn refund(user_id: impl Into<String>, order_id: Uuid, amount: Decimal) -> Self {
        Self::new(user_id, amount.abs(), CreditKind::Refunded, Some(order_id), format!("Returned from order {}", order_id))
    }

    fn new(user_id: impl Into<String>, amount: Decimal, kind: CreditKind, order_id: Option<Uuid>, reason: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7(), user_id: user_id.into(), amount: round_cents(amount), kind, order_id, reason: reason.into(), created_at: Utc::now() }
    }

    pub fn is_debit(&self) -> bool { self.amount.is_sign_negative() }
}

/// Credits usable on an order: `min(requested, balance, subtotal - discount)`, never negative.
pub fn credits_to_apply(requested: Decimal, balance: Decimal, subtotal: Decimal, discount: Decimal) -> Decimal {
    round_cents(requested.min(balance).min(subtotal - discount).max(Decimal::ZERO))
}
