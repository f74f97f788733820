//! Cart checkout.
//!
//! Only an empty cart or a failed order insert abort a checkout. Every later
//! step (credit debit, discount usage, payment session, notification) reports
//! its failure in `errors` and the flow carries on with what succeeded.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::credits::CreditService;
use crate::discounts::DiscountService;
use crate::domain::aggregates::{credits_to_apply, Address, Cart, CartItem, Customer, DiscountCode, Order, OrderItem, Pricing};
use crate::domain::value_objects::format_dollars;
use crate::orders::OrderService;
use crate::payments::{CheckoutSession, PaymentGateway, SessionRequest};
use crate::{Result, ServiceError};

/// Attempts at drawing an unused order number before giving up.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
    pub user_id: Option<String>,
    #[validate(email)]
    pub email: String,
    pub shipping_address: Option<Address>,
    pub discount_code: Option<String>,
    pub credits_to_use: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub success: bool,
    pub order_id: Uuid,
    pub order_number: String,
    pub checkout_url: Option<String>,
    pub session_id: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub credits_applied: Decimal,
    pub total: Decimal,
    pub errors: Vec<String>,
}

pub struct CheckoutService {
    discounts: Arc<DiscountService>,
    credits: Arc<CreditService>,
    orders: Arc<OrderService>,
    payments: Option<Arc<dyn PaymentGateway>>,
    frontend_url: String,
    next_order_number: fn() -> String,
}

/// Date-stamped order number, e.g. `PS-261016-4821`.
pub fn generate_order_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("PS-{}-{}", Utc::now().format("%y%m%d"), suffix)
}

impl CheckoutService {
    pub fn new(
        discounts: Arc<DiscountService>,
        credits: Arc<CreditService>,
        orders: Arc<OrderService>,
        payments: Option<Arc<dyn PaymentGateway>>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self { discounts, credits, orders, payments, frontend_url: frontend_url.into(), next_order_number: generate_order_number }
    }

    pub fn with_order_numbers(mut self, next: fn() -> String) -> Self {
        self.next_order_number = next;
        self
    }

    #[instrument(skip(self, request), fields(user_id = ?request.user_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        request.validate()?;
        if let Some(address) = &request.shipping_address { address.validate()?; }
        let cart = Cart::from_items(request.items)?;
        if cart.is_empty() { return Err(ServiceError::invalid("Cart is empty")); }
        let subtotal = cart.subtotal()?;
        let customer = Customer { user_id: request.user_id.filter(|u| !u.trim().is_empty()), email: request.email.trim().to_string() };
        let mut errors = Vec::new();

        let discount = match request.discount_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => self.apply_discount(code, subtotal, &customer, &mut errors).await,
            None => None,
        };
        let discount_amount = discount.as_ref().map_or(Decimal::ZERO, |(_, amount)| *amount);

        let requested = request.credits_to_use.filter(|c| *c > Decimal::ZERO);
        let credits = match (customer.user_id.as_deref(), requested) {
            (Some(user_id), Some(requested)) => match self.credits.balance(user_id).await {
                Ok(balance) => credits_to_apply(requested, balance, subtotal, discount_amount),
                Err(e) => {
                    errors.push(format!("Store credits unavailable: {e}"));
                    Decimal::ZERO
                }
            },
            (None, Some(_)) => {
                errors.push("Sign in to use store credits".to_string());
                Decimal::ZERO
            }
            _ => Decimal::ZERO,
        };

        let pricing = Pricing {
            subtotal,
            discount_code: discount.as_ref().map(|(code, _)| code.code.clone()),
            discount_amount,
            credits_applied: credits,
        };
        let (mut order, items) = self.insert_order(&cart, &customer, request.shipping_address, pricing).await?;

        let mut credits_debited = false;
        if let (Some(user_id), true) = (customer.user_id.as_deref(), order.credits_applied > Decimal::ZERO) {
            match self.credits.redeem_for_order(user_id, order.id, order.credits_applied).await {
                Ok(_) => credits_debited = true,
                Err(e) => {
                    errors.push(format!("Store credits could not be applied: {e}"));
                    order.drop_credits();
                }
            }
        }

        if let Some((code, amount)) = &discount {
            if let Err(e) = self.discounts.record_usage(code, order.id, customer.user_id.clone(), customer.guest_email(), *amount).await {
                errors.push(format!("Discount code {} could not be applied: {e}", code.code));
                order.drop_discount();
            }
        }

        let mut session = None;
        if order.total_price.is_zero() {
            order.mark_paid(None)?;
            info!(order_id = %order.id, "order fully covered, no payment needed");
        } else {
            match self.create_session(&order).await {
                Ok(created) => {
                    order.stripe_session_id = Some(created.id.clone());
                    session = Some(created);
                }
                Err(e) => {
                    errors.push(format!("Payment session could not be created: {e}"));
                    if credits_debited {
                        if let Some(user_id) = customer.user_id.as_deref() {
                            match self.credits.refund_for_order(user_id, order.id, order.credits_applied).await {
                                Ok(_) => order.drop_credits(),
                                Err(e) => errors.push(format!("Store credits could not be refunded: {e}")),
                            }
                        }
                    }
                }
            }
        }

        if let Err(e) = self.orders.persist(&mut order).await {
            warn!(order_id = %order.id, error = %e, "failed to save order after checkout");
            errors.push(format!("Order could not be updated: {e}"));
        }

        let message = format!(
            "🛒 New order #{}: ${} ({} item{}) from {}",
            order.order_number,
            format_dollars(order.total_price),
            items.len(),
            if items.len() == 1 { "" } else { "s" },
            order.customer_email,
        );
        if let Err(e) = self.orders.notify(&message).await {
            errors.push(format!("Notification failed: {e}"));
        }

        let success = order.is_paid() || session.is_some();
        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_price, success, errors = errors.len(), "checkout finished");
        let (session_id, checkout_url) = match session {
            Some(CheckoutSession { id, url }) => (Some(id), Some(url)),
            None => (None, None),
        };
        Ok(CheckoutOutcome {
            success,
            order_id: order.id,
            order_number: order.order_number,
            checkout_url,
            session_id,
            subtotal: order.subtotal,
            discount_amount: order.discount_amount,
            credits_applied: order.credits_applied,
            total: order.total_price,
            errors,
        })
    }

    /// Inserts the pending order, drawing a fresh order number when the
    /// random one is already taken.
    async fn insert_order(&self, cart: &Cart, customer: &Customer, shipping_address: Option<Address>, pricing: Pricing) -> Result<(Order, Vec<OrderItem>)> {
        let mut attempt = 1;
        loop {
            let mut order = Order::create((self.next_order_number)(), customer, shipping_address.clone(), pricing.clone());
            let items = cart.items().iter().map(|item| OrderItem::from_cart_item(order.id, item)).collect::<std::result::Result<Vec<_>, _>>()?;
            if self.orders.create(&mut order, &items).await? {
                return Ok((order, items));
            }
            if attempt == ORDER_NUMBER_ATTEMPTS {
                return Err(ServiceError::UpstreamFailure(format!("no free order number after {attempt} attempts")));
            }
            warn!(order_number = %order.order_number, attempt, "order number taken, retrying");
            attempt += 1;
        }
    }

    async fn apply_discount(&self, code: &str, subtotal: Decimal, customer: &Customer, errors: &mut Vec<String>) -> Option<(DiscountCode, Decimal)> {
        match self.discounts.validate_code(code, subtotal, customer.user_id.as_deref(), Some(customer.email.as_str())).await {
            Ok(validation) if validation.valid => validation.discount_code.map(|d| (d, validation.discount_amount)),
            Ok(validation) => {
                errors.push(format!("Discount code {code}: {}", validation.message));
                None
            }
            Err(e) => {
                warn!(code = %code, error = %e, "discount lookup failed during checkout");
                errors.push(format!("Discount code {code} could not be checked: {e}"));
                None
            }
        }
    }

    async fn create_session(&self, order: &Order) -> Result<CheckoutSession> {
        let gateway = self.payments.as_ref().ok_or(ServiceError::NotConfigured("Stripe"))?;
        gateway.create_checkout_session(&SessionRequest::for_order(order, &self.frontend_url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::domain::aggregates::{DiscountType, FinancialStatus, OrderStatus};
    use crate::domain::aggregates::DiscountUsage;
    use crate::domain::value_objects::PromoCode;
    use crate::store::{DiscountStore, MemoryStore, OrderStore};
    use crate::test_utils::{sample_order, FakePayments, RecordingNotifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        svc: CheckoutService,
        store: Arc<MemoryStore>,
        credits: Arc<CreditService>,
        orders: Arc<OrderService>,
        payments: Arc<FakePayments>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(payments: FakePayments) -> Harness {
        build(payments, RecordingNotifier::default(), |store| store as Arc<dyn DiscountStore>)
    }

    fn build(payments: FakePayments, notifier: RecordingNotifier, discount_store: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn DiscountStore>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let payments = Arc::new(payments);
        let discounts = Arc::new(DiscountService::new(discount_store(store.clone()), EventBus::disabled()));
        let credits = Arc::new(CreditService::new(store.clone(), notifier.clone(), EventBus::disabled()));
        let orders = Arc::new(OrderService::new(store.clone(), notifier.clone(), EventBus::disabled()));
        let svc = CheckoutService::new(discounts, credits.clone(), orders.clone(), Some(payments.clone()), "http://localhost:3000");
        Harness { svc, store, credits, orders, payments, notifier }
    }

    async fn seed_discount(store: &MemoryStore, code: &str, kind: DiscountType, value: i64) -> DiscountCode {
        let discount = DiscountCode::create(
            PromoCode::new(code).unwrap(), kind, Decimal::new(value, 0), Decimal::ZERO, None,
            Utc::now() - chrono::Duration::days(1), None,
        );
        store.insert_discount(&discount).await.unwrap();
        discount
    }

    fn item(price: i64) -> CartItem {
        CartItem {
            product_id: "die-cut".into(), product_name: "Die-cut stickers".into(), quantity: 1,
            unit_price: Decimal::new(price, 0), calculator_selections: serde_json::json!({"width": 3}), custom_files: vec![],
        }
    }

    fn request(price: i64, code: Option<&str>, credits: Option<i64>) -> CheckoutRequest {
        CheckoutRequest {
            items: vec![item(price)], user_id: Some("user-1".into()), email: "ada@example.com".into(),
            shipping_address: None, discount_code: code.map(str::to_string), credits_to_use: credits.map(|c| Decimal::new(c, 0)),
        }
    }

    #[tokio::test]
    async fn test_discount_and_credits_scenario() {
        let h = harness(FakePayments::default());
        let discount = seed_discount(&h.store, "SAVE20", DiscountType::FixedAmount, 20).await;
        h.credits.grant("user-1", Decimal::new(50, 0), "loyalty").await.unwrap();

        let outcome = h.svc.checkout(request(100, Some("save20"), Some(50))).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.errors);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.discount_amount, Decimal::new(20, 0));
        assert_eq!(outcome.credits_applied, Decimal::new(50, 0));
        assert_eq!(outcome.total, Decimal::new(30, 0));
        assert!(outcome.checkout_url.is_some());

        assert_eq!(h.credits.balance("user-1").await.unwrap(), Decimal::ZERO);
        assert_eq!(h.payments.requests()[0].amount, Decimal::new(30, 0));
        assert_eq!(h.store.usage_for(discount.id).await.unwrap().len(), 1);
        let order = h.orders.get_order(outcome.order_id).await.unwrap();
        assert_eq!(order.order_status, OrderStatus::AwaitingPayment);
        assert_eq!(order.stripe_session_id, outcome.session_id);
        assert_eq!(h.orders.order_items(order.id).await.unwrap().len(), 1);
        assert_eq!(h.notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_code_is_reported_not_fatal() {
        let h = harness(FakePayments::default());
        let outcome = h.svc.checkout(request(40, Some("NOPE"), None)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.discount_amount, Decimal::ZERO);
        assert_eq!(outcome.total, Decimal::new(40, 0));
    }

    #[tokio::test]
    async fn test_session_failure_refunds_credits() {
        let h = harness(FakePayments::failing());
        h.credits.grant("user-1", Decimal::new(10, 0), "apology").await.unwrap();

        let outcome = h.svc.checkout(request(40, None, Some(10))).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors.iter().any(|e| e.contains("Payment session")));
        assert_eq!(outcome.credits_applied, Decimal::ZERO);
        assert_eq!(h.credits.balance("user-1").await.unwrap(), Decimal::new(10, 0));
        assert_eq!(h.orders.get_order(outcome.order_id).await.unwrap().credits_applied, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_fully_covered_order_is_paid() {
        let h = harness(FakePayments::default());
        h.credits.grant("user-1", Decimal::new(25, 0), "gift").await.unwrap();
        let outcome = h.svc.checkout(request(20, None, Some(25))).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.total, Decimal::ZERO);
        assert!(outcome.checkout_url.is_none());
        assert!(h.payments.requests().is_empty());
        let order = h.orders.get_order(outcome.order_id).await.unwrap();
        assert_eq!(order.financial_status, FinancialStatus::Paid);
        assert_eq!(h.credits.balance("user-1").await.unwrap(), Decimal::new(5, 0));
    }

    #[tokio::test]
    async fn test_empty_cart_and_guest_credits() {
        let h = harness(FakePayments::default());
        let mut empty = request(10, None, None);
        empty.items.clear();
        assert!(matches!(h.svc.checkout(empty).await, Err(ServiceError::ValidationFailed(_))));

        let mut guest = request(10, None, Some(5));
        guest.user_id = None;
        let outcome = h.svc.checkout(guest).await.unwrap();
        assert_eq!(outcome.errors, vec!["Sign in to use store credits".to_string()]);
        assert_eq!(outcome.credits_applied, Decimal::ZERO);
    }

    /// Another checkout claims the code between validation and usage recording.
    struct CompetingCheckout(Arc<MemoryStore>);

    #[async_trait]
    impl DiscountStore for CompetingCheckout {
        async fn list_discounts(&self) -> Result<Vec<DiscountCode>> { self.0.list_discounts().await }
        async fn find_discount(&self, id: Uuid) -> Result<Option<DiscountCode>> { self.0.find_discount(id).await }
        async fn find_discount_by_code(&self, code: &str) -> Result<Option<DiscountCode>> { self.0.find_discount_by_code(code).await }
        async fn insert_discount(&self, discount: &DiscountCode) -> Result<()> { self.0.insert_discount(discount).await }
        async fn update_discount(&self, discount: &DiscountCode) -> Result<()> { self.0.update_discount(discount).await }
        async fn delete_discount(&self, id: Uuid) -> Result<bool> { self.0.delete_discount(id).await }
        async fn record_usage(&self, usage: &DiscountUsage) -> Result<()> {
            let rival = DiscountUsage::new(usage.discount_code_id, Uuid::now_v7(), Some("user-2".into()), None, usage.discount_amount);
            self.0.record_usage(&rival).await?;
            self.0.record_usage(usage).await
        }
        async fn usage_for(&self, discount_id: Uuid) -> Result<Vec<DiscountUsage>> { self.0.usage_for(discount_id).await }
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_order() {
        let h = build(FakePayments::default(), RecordingNotifier::failing(), |store| store as Arc<dyn DiscountStore>);
        let outcome = h.svc.checkout(request(40, None, None)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.checkout_url.is_some());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("Notification failed"));
        assert_eq!(h.notifier.messages().len(), 1);
        let order = h.orders.get_order(outcome.order_id).await.unwrap();
        assert_eq!(order.stripe_session_id, outcome.session_id);
    }

    #[tokio::test]
    async fn test_exhausted_code_is_dropped_from_order() {
        let h = build(FakePayments::default(), RecordingNotifier::default(), |store| Arc::new(CompetingCheckout(store)) as Arc<dyn DiscountStore>);
        let mut discount = seed_discount(&h.store, "LAST1", DiscountType::FixedAmount, 10).await;
        discount.usage_limit = Some(1);
        h.store.update_discount(&discount).await.unwrap();

        let outcome = h.svc.checkout(request(50, Some("LAST1"), None)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("LAST1"));
        assert_eq!(outcome.discount_amount, Decimal::ZERO);
        assert_eq!(outcome.total, Decimal::new(50, 0));
        assert_eq!(h.payments.requests()[0].amount, Decimal::new(50, 0));

        let order = h.orders.get_order(outcome.order_id).await.unwrap();
        assert_eq!(order.discount_code, None);
        assert_eq!(order.total_price, Decimal::new(50, 0));
        let stored = h.store.find_discount(discount.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
    }

    fn taken_then_fresh() -> String {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        match CALLS.fetch_add(1, Ordering::SeqCst) {
            0 => "PS-1001".to_string(),
            n => format!("PS-FRESH-{n}"),
        }
    }

    #[tokio::test]
    async fn test_order_number_collision_retries() {
        let h = harness(FakePayments::default());
        h.store.insert_order(&sample_order(), &[]).await.unwrap();

        let svc = CheckoutService::new(
            Arc::new(DiscountService::new(h.store.clone(), EventBus::disabled())), h.credits.clone(), h.orders.clone(),
            Some(h.payments.clone()), "http://localhost:3000",
        ).with_order_numbers(taken_then_fresh);
        let outcome = svc.checkout(request(40, None, None)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.order_number.starts_with("PS-FRESH-"));

        let always_taken = svc.with_order_numbers(|| "PS-1001".to_string());
        assert!(matches!(always_taken.checkout(request(40, None, None)).await, Err(ServiceError::UpstreamFailure(_))));
    }
}
