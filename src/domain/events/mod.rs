//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Credit(CreditEvent),
    Discount(DiscountEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, total: Decimal },
    Paid { order_id: Uuid, session_id: Option<String> },
    PaymentFailed { order_id: Uuid },
    Cancelled { order_id: Uuid },
    ProofsSent { order_id: Uuid, count: usize },
    ProofApproved { order_id: Uuid, proof_id: Uuid, all_approved: bool },
    ProofChangesRequested { order_id: Uuid, proof_id: Uuid },
    Shipped { order_id: Uuid, tracking_number: String },
    Delivered { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CreditEvent {
    Granted { user_id: String, amount: Decimal },
    Redeemed { user_id: String, order_id: Uuid, amount: Decimal },
    Refunded { user_id: String, order_id: Uuid, amount: Decimal },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountEvent {
    Redeemed { code: String, order_id: Uuid, amount: Decimal },
}

impl DomainEvent {
    /// NATS subject, `commerce.<aggregate>.<event>`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Order(e) => ("order", match e {
                OrderEvent::Created { .. } => "created",
                OrderEvent::Paid { .. } => "paid",
                OrderEvent::PaymentFailed { .. } => "payment_failed",
                OrderEvent::Cancelled { .. } => "cancelled",
                OrderEvent::ProofsSent { .. } => "proofs_sent",
                OrderEvent::ProofApproved { .. } => "proof_approved",
                OrderEvent::ProofChangesRequested { .. } => "proof_changes_requested",
                OrderEvent::Shipped { .. } => "shipped",
                OrderEvent::Delivered { .. } => "delivered",
            }),
            Self::Credit(e) => ("credit", match e {
                CreditEvent::Granted { .. } => "granted",
                CreditEvent::Redeemed { .. } => "redeemed",
                CreditEvent::Refunded { .. } => "refunded",
            }),
            Self::Discount(DiscountEvent::Redeemed { .. }) => ("discount", "redeemed"),
        };
        format!("commerce.{aggregate}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_subject_and_payload() {
        let id = Uuid::nil();
        let event = DomainEvent::Order(OrderEvent::Delivered { order_id: id });
        assert_eq!(event.subject(), "commerce.order.delivered");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["aggregate"], "order");
        assert_eq!(json["event"]["type"], "delivered");
    }
}
