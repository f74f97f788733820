//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::cart::{CartError, CartItem};
use crate::domain::aggregates::proof::{Proof, ProofError, ProofState};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{round_cents, text_enum};

text_enum! { FinancialStatus { Pending => "pending", Paid => "paid", Failed => "failed", Refunded => "refunded" } }
text_enum! { FulfillmentStatus { Unfulfilled => "unfulfilled", Shipped => "shipped", Delivered => "delivered" } }
text_enum! {
    OrderStatus {
        AwaitingPayment => "Awaiting Payment",
        CreatingProofs => "Creating Proofs",
        ProofsSent => "Proofs Sent",
        ReadyForProduction => "Ready for Production",
        Shipped => "Shipped",
        Delivered => "Delivered",
        Cancelled => "Cancelled",
    }
}
text_enum! {
    /// Roll-up of the order's proofs.
    OrderProofStatus {
        None => "none",
        Pending => "pending",
        Sent => "sent",
        Approved => "approved",
        ChangesRequested => "changes_requested",
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1))]
    pub name: String,
    pub company: Option<String>,
    #[validate(length(min = 1))]
    pub street1: String,
    pub street2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 3, max = 10))]
    pub zip: String,
    #[validate(length(equal = 2))]
    pub country: String,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

/// Who is paying: a signed-in user or a guest identified by email.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer { pub user_id: Option<String>, pub email: String }

impl Customer {
    pub fn guest_email(&self) -> Option<String> { self.user_id.is_none().then(|| self.email.clone()) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub calculator_selections: serde_json::Value,
    pub custom_files: Vec<String>,
}

impl OrderItem {
    pub fn from_cart_item(order_id: Uuid, item: &CartItem) -> Result<Self, CartError> {
        Ok(Self {
            id: Uuid::now_v7(), order_id, product_id: item.product_id.clone(), product_name: item.product_name.clone(),
            quantity: item.quantity, unit_price: item.unit_price, total_price: item.line_total()?,
            calculator_selections: item.calculator_selections.clone(), custom_files: item.custom_files.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<String>,
    pub customer_email: String,
    pub financial_status: FinancialStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub order_status: OrderStatus,
    pub proof_status: OrderProofStatus,
    pub subtotal: Decimal,
    pub discount_code: Option<String>,
    pub discount_amount: Decimal,
    pub credits_applied: Decimal,
    pub total_price: Decimal,
    pub shipping_address: Option<Address>,
    pub proofs: Vec<Proof>,
    pub tracking_number: Option<String>,
    pub tracking_company: Option<String>,
    pub tracking_url: Option<String>,
    pub tracking_status: Option<String>,
    pub stripe_session_id: Option<String>,
    pub shipment_id: Option<String>,
    pub label_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Default)]
pub struct Pricing { pub subtotal: Decimal, pub discount_code: Option<String>, pub discount_amount: Decimal, pub credits_applied: Decimal }

impl Order {
    pub fn create(order_number: impl Into<String>, customer: &Customer, shipping_address: Option<Address>, pricing: Pricing) -> Self {
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: order_number.into(), user_id: customer.user_id.clone(),
            customer_email: customer.email.clone(), financial_status: FinancialStatus::Pending,
            fulfillment_status: FulfillmentStatus::Unfulfilled, order_status: OrderStatus::AwaitingPayment,
            proof_status: OrderProofStatus::None, subtotal: pricing.subtotal, discount_code: pricing.discount_code,
            discount_amount: pricing.discount_amount, credits_applied: pricing.credits_applied, total_price: Decimal::ZERO,
            shipping_address, proofs: vec![], tracking_number: None, tracking_company: None, tracking_url: None,
            tracking_status: None, stripe_session_id: None, shipment_id: None, label_url: None,
            created_at: now, updated_at: now, events: vec![],
        };
        order.recalculate();
        order.raise_event(OrderEvent::Created { order_id: order.id, order_number: order.order_number.clone(), total: order.total_price });
        order
    }

    pub fn is_paid(&self) -> bool { self.financial_status == FinancialStatus::Paid }
    pub fn has_shipped(&self) -> bool { self.fulfillment_status != FulfillmentStatus::Unfulfilled }

    /// Removes credits that could not be debited.
    pub fn drop_credits(&mut self) { self.credits_applied = Decimal::ZERO; self.recalculate(); }

    /// Removes a discount whose usage could not be recorded.
    pub fn drop_discount(&mut self) {
        self.discount_code = None;
        self.discount_amount = Decimal::ZERO;
        self.recalculate();
    }

    pub fn mark_paid(&mut self, session_id: Option<String>) -> Result<(), OrderError> {
        if self.is_paid() { return Ok(()); }
        if self.order_status == OrderStatus::Cancelled { return Err(OrderError::Cancelled); }
        self.financial_status = FinancialStatus::Paid;
        self.order_status = OrderStatus::CreatingProofs;
        if session_id.is_some() { self.stripe_session_id = session_id.clone(); }
        self.touch();
        self.raise_event(OrderEvent::Paid { order_id: self.id, session_id });
        Ok(())
    }

    pub fn mark_payment_failed(&mut self) {
        if self.is_paid() { return; }
        self.financial_status = FinancialStatus::Failed;
        self.touch();
        self.raise_event(OrderEvent::PaymentFailed { order_id: self.id });
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.has_shipped() { return Err(OrderError::CannotCancel); }
        if self.order_status == OrderStatus::Cancelled { return Ok(()); }
        self.order_status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(OrderEvent::Cancelled { order_id: self.id });
        Ok(())
    }

    pub fn add_proof(&mut self, proof_url: impl Into<String>, notes: Option<String>) -> Result<Uuid, OrderError> {
        self.ensure_in_proofing()?;
        let proof = Proof::new(proof_url, notes);
        let id = proof.id;
        self.proofs.push(proof);
        self.refresh_proof_status();
        self.touch();
        Ok(id)
    }

    /// Sends every pending proof to the customer.
    pub fn send_proofs(&mut self) -> Result<usize, OrderError> {
        self.ensure_in_proofing()?;
        let mut sent = 0;
        for proof in self.proofs.iter_mut().filter(|p| p.status == ProofState::Pending) {
            proof.send()?;
            sent += 1;
        }
        if sent == 0 { return Err(OrderError::NoPendingProofs); }
        self.order_status = OrderStatus::ProofsSent;
        self.refresh_proof_status();
        self.touch();
        self.raise_event(OrderEvent::ProofsSent { order_id: self.id, count: sent });
        Ok(sent)
    }

    /// Approves one proof; the last approval readies the order for production.
    pub fn approve_proof(&mut self, proof_id: Uuid) -> Result<bool, OrderError> {
        self.ensure_in_proofing()?;
        self.proof_mut(proof_id)?.approve()?;
        self.refresh_proof_status();
        let all_approved = self.proof_status == OrderProofStatus::Approved;
        if all_approved { self.order_status = OrderStatus::ReadyForProduction; }
        self.touch();
        self.raise_event(OrderEvent::ProofApproved { order_id: self.id, proof_id, all_approved });
        Ok(all_approved)
    }

    pub fn request_proof_changes(&mut self, proof_id: Uuid, customer_notes: Option<String>) -> Result<(), OrderError> {
        self.ensure_in_proofing()?;
        self.proof_mut(proof_id)?.request_changes(customer_notes)?;
        self.refresh_proof_status();
        self.touch();
        self.raise_event(OrderEvent::ProofChangesRequested { order_id: self.id, proof_id });
        Ok(())
    }

    pub fn replace_proof(&mut self, proof_id: Uuid, proof_url: impl Into<String>) -> Result<(), OrderError> {
        self.ensure_in_proofing()?;
        self.proof_mut(proof_id)?.replace(proof_url)?;
        self.refresh_proof_status();
        self.touch();
        Ok(())
    }

    pub fn ship(&mut self, tracking_number: impl Into<String>, company: impl Into<String>, url: Option<String>) -> Result<(), OrderError> {
        if self.order_status == OrderStatus::Cancelled { return Err(OrderError::Cancelled); }
        let tracking_number = tracking_number.into();
        self.tracking_number = Some(tracking_number.clone());
        self.tracking_company = Some(company.into());
        self.tracking_url = url;
        if self.fulfillment_status == FulfillmentStatus::Unfulfilled {
            self.fulfillment_status = FulfillmentStatus::Shipped;
            self.order_status = OrderStatus::Shipped;
            self.raise_event(OrderEvent::Shipped { order_id: self.id, tracking_number });
        }
        self.touch();
        Ok(())
    }

    /// Applies a carrier tracking status (`in_transit`, `delivered`, ...).
    pub fn apply_tracking_status(&mut self, status: &str, public_url: Option<String>) {
        self.tracking_status = Some(status.to_string());
        if public_url.is_some() { self.tracking_url = public_url; }
        match status {
            "delivered" if self.fulfillment_status != FulfillmentStatus::Delivered => {
                self.fulfillment_status = FulfillmentStatus::Delivered;
                self.order_status = OrderStatus::Delivered;
                self.raise_event(OrderEvent::Delivered { order_id: self.id });
            }
            "in_transit" | "out_for_delivery" if self.fulfillment_status == FulfillmentStatus::Unfulfilled => {
                self.fulfillment_status = FulfillmentStatus::Shipped;
                self.order_status = OrderStatus::Shipped;
            }
            _ => {}
        }
        self.touch();
    }

    /// Proofs can only change before the order leaves the shop.
    fn ensure_in_proofing(&self) -> Result<(), OrderError> {
        if self.order_status == OrderStatus::Cancelled { return Err(OrderError::Cancelled); }
        if self.has_shipped() { return Err(OrderError::AlreadyShipped); }
        Ok(())
    }

    /// A label may only be bought for a paid order that has not shipped.
    pub fn ensure_label_allowed(&self) -> Result<(), OrderError> {
        self.ensure_in_proofing()?;
        if !self.is_paid() { return Err(OrderError::NotPaid); }
        Ok(())
    }

    fn proof_mut(&mut self, proof_id: Uuid) -> Result<&mut Proof, OrderError> {
        self.proofs.iter_mut().find(|p| p.id == proof_id).ok_or(OrderError::Proof(ProofError::NotFound(proof_id)))
    }

    fn refresh_proof_status(&mut self) {
        let any = |state: ProofState| self.proofs.iter().any(|p| p.status == state);
        self.proof_status = if self.proofs.is_empty() {
            OrderProofStatus::None
        } else if self.proofs.iter().all(|p| p.status == ProofState::Approved) {
            OrderProofStatus::Approved
        } else if any(ProofState::ChangesRequested) {
            OrderProofStatus::ChangesRequested
        } else if any(ProofState::Pending) {
            OrderProofStatus::Pending
        } else {
            OrderProofStatus::Sent
        };
    }

    fn recalculate(&mut self) {
        let total = self.subtotal - self.discount_amount - self.credits_applied;
        self.total_price = round_cents(total.max(Decimal::ZERO));
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(DomainEvent::Order(e)); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { CannotCancel, Cancelled, AlreadyShipped, NotPaid, NoPendingProofs, Proof(ProofError) }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CannotCancel => write!(f, "Order has already shipped and cannot be cancelled"),
            Self::Cancelled => write!(f, "Order is cancelled"),
            Self::AlreadyShipped => write!(f, "Order has already shipped"),
            Self::NotPaid => write!(f, "Order has not been paid"),
            Self::NoPendingProofs => write!(f, "Order has no pending proofs to send"),
            Self::Proof(e) => write!(f, "{}", e),
        }
    }
}
impl From<ProofError> for OrderError { fn from(e: ProofError) -> Self { Self::Proof(e) } }

impl From<OrderError> for crate::ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Proof(e) => e.into(),
            other => crate::ServiceError::ValidationFailed(other.to_string()),
        }
    }
}
