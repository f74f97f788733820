//! Store credit balances, history and redemption.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::domain::aggregates::CreditTransaction;
use crate::domain::events::{CreditEvent, DomainEvent};
use crate::domain::value_objects::format_dollars;
use crate::notify::Notifier;
use crate::store::CreditStore;
use crate::{Result, ServiceError};

pub struct CreditService {
    store: Arc<dyn CreditStore>,
    notifier: Arc<dyn Notifier>,
    bus: EventBus,
}

impl CreditService {
    pub fn new(store: Arc<dyn CreditStore>, notifier: Arc<dyn Notifier>, bus: EventBus) -> Self {
        Self { store, notifier, bus }
    }

    pub async fn balance(&self, user_id: &str) -> Result<Decimal> { self.store.balance(user_id).await }

    pub async fn history(&self, user_id: &str) -> Result<Vec<CreditTransaction>> { self.store.history(user_id).await }

    /// Adds credits to an account (admin action).
    pub async fn grant(&self, user_id: &str, amount: Decimal, reason: &str) -> Result<CreditTransaction> {
        if amount <= Decimal::ZERO { return Err(ServiceError::invalid("Credit amount must be positive")); }
        if reason.trim().is_empty() { return Err(ServiceError::invalid("A reason is required")); }
        let entry = CreditTransaction::grant(user_id, amount, reason.trim());
        let balance = self.store.apply(&entry).await?;
        info!(user_id = %user_id, amount = %entry.amount, balance = %balance, "credits granted");
        self.bus.publish_all(vec![DomainEvent::Credit(CreditEvent::Granted { user_id: user_id.to_string(), amount: entry.amount })]).await;
        let message = format!("💰 ${} store credit granted to {} ({}). New balance ${}", format_dollars(entry.amount), user_id, entry.reason, format_dollars(balance));
        if let Err(e) = self.notifier.notify(&message).await {
            warn!(user_id = %user_id, error = %e, "credit notification failed");
        }
        Ok(entry)
    }

    /// Debits credits for an order; fails without side effects when the balance is short.
    pub async fn redeem_for_order(&self, user_id: &str, order_id: Uuid, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO { return self.balance(user_id).await; }
        let balance = self.store.apply(&CreditTransaction::redeem(user_id, order_id, amount)).await?;
        info!(user_id = %user_id, order_id = %order_id, amount = %amount, balance = %balance, "credits redeemed");
        self.bus.publish_all(vec![DomainEvent::Credit(CreditEvent::Redeemed { user_id: user_id.to_string(), order_id, amount })]).await;
        Ok(balance)
    }

    /// Returns credits an order no longer uses. Repeat calls for the same
    /// order are no-ops.
    pub async fn refund_for_order(&self, user_id: &str, order_id: Uuid, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO { return self.balance(user_id).await; }
        let Some(balance) = self.store.apply_refund(&CreditTransaction::refund(user_id, order_id, amount)).await? else {
            info!(user_id = %user_id, order_id = %order_id, "credits already refunded for order");
            return self.balance(user_id).await;
        };
        info!(user_id = %user_id, order_id = %order_id, amount = %amount, balance = %balance, "credits refunded");
        self.bus.publish_all(vec![DomainEvent::Credit(CreditEvent::Refunded { user_id: user_id.to_string(), order_id, amount })]).await;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::CreditKind;
    use crate::test_utils::RecordingNotifier;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_grant_redeem_refund() {
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = CreditService::new(Arc::new(MemoryStore::new()), notifier.clone(), EventBus::disabled());
        let order = Uuid::now_v7();

        svc.grant("u1", Decimal::new(25, 0), "referral").await.unwrap();
        assert_eq!(svc.redeem_for_order("u1", order, Decimal::new(10, 0)).await.unwrap(), Decimal::new(15, 0));
        assert!(svc.redeem_for_order("u1", order, Decimal::new(20, 0)).await.is_err());
        assert_eq!(svc.refund_for_order("u1", order, Decimal::new(10, 0)).await.unwrap(), Decimal::new(25, 0));

        let history = svc.history("u1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().any(|e| e.kind == CreditKind::Refunded));
        assert_eq!(notifier.messages().len(), 1);
        assert!(notifier.messages()[0].contains("$25.00"));
    }

    #[tokio::test]
    async fn test_refund_applies_once_per_order() {
        let svc = CreditService::new(Arc::new(MemoryStore::new()), Arc::new(RecordingNotifier::default()), EventBus::disabled());
        let order = Uuid::now_v7();
        svc.grant("u1", Decimal::new(20, 0), "referral").await.unwrap();
        svc.redeem_for_order("u1", order, Decimal::new(20, 0)).await.unwrap();

        assert_eq!(svc.refund_for_order("u1", order, Decimal::new(20, 0)).await.unwrap(), Decimal::new(20, 0));
        assert_eq!(svc.refund_for_order("u1", order, Decimal::new(20, 0)).await.unwrap(), Decimal::new(20, 0));
        assert_eq!(svc.history("u1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_grant_rejects_non_positive() {
        let svc = CreditService::new(Arc::new(MemoryStore::new()), Arc::new(RecordingNotifier::default()), EventBus::disabled());
        assert!(matches!(svc.grant("u1", Decimal::ZERO, "oops").await, Err(ServiceError::ValidationFailed(_))));
        assert_eq!(svc.balance("u1").await.unwrap(), Decimal::ZERO);
    }
}
