//! Shared fixtures and gateway fakes for unit tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::aggregates::{Address, Customer, Order, Pricing};
use crate::domain::value_objects::Parcel;
use crate::notify::Notifier;
use crate::payments::{CheckoutSession, PaymentGateway, SessionRequest};
use crate::shipping::{PurchasedLabel, Rate, Shipment, ShippingGateway, TrackingInfo};
use crate::{Result, ServiceError};

/// Keeps every message; optionally fails each call after recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self { Self { messages: Mutex::default(), fail: true } }
    pub fn messages(&self) -> Vec<String> { self.messages.lock().unwrap().clone() }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail { Err(ServiceError::UpstreamFailure("discord unavailable".into())) } else { Ok(()) }
    }
}

pub fn sample_address() -> Address {
    Address {
        name: "Ada Lovelace".into(), company: None, street1: "417 Montgomery St".into(), street2: None,
        city: "San Francisco".into(), state: Some("CA".into()), zip: "94104".into(), country: "US".into(),
        phone: None, email: Some("ada@example.com".into()),
    }
}

/// A pending $40 order for `user-1`.
pub fn sample_order() -> Order {
    let customer = Customer { user_id: Some("user-1".into()), email: "ada@example.com".into() };
    Order::create("PS-1001", &customer, Some(sample_address()), Pricing { subtotal: Decimal::new(40, 0), ..Pricing::default() })
}

pub fn rate(carrier: &str) -> Rate {
    Rate { id: format!("rate_{}", carrier.to_lowercase()), carrier: carrier.into(), service: "Ground".into(), rate: Decimal::new(899, 2), delivery_days: Some(3) }
}

#[derive(Default)]
pub struct FakePayments {
    requests: Mutex<Vec<SessionRequest>>,
    fail: bool,
}

impl FakePayments {
    pub fn failing() -> Self { Self { requests: Mutex::default(), fail: true } }
    pub fn requests(&self) -> Vec<SessionRequest> { self.requests.lock().unwrap().clone() }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_checkout_session(&self, request: &SessionRequest) -> Result<CheckoutSession> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail { return Err(ServiceError::UpstreamFailure("Stripe: card declined".into())); }
        Ok(CheckoutSession { id: format!("cs_{}", request.order_number), url: format!("https://checkout.stripe.test/{}", request.order_id) })
    }
}

/// Replays canned rate lists in order, repeating the last one.
pub struct FakeShipping {
    responses: Vec<Vec<Rate>>,
    calls: AtomicUsize,
    labels: AtomicUsize,
    last_parcel: Mutex<Option<Parcel>>,
}

impl Default for FakeShipping {
    fn default() -> Self { Self::with_responses(vec![vec![rate("UPS"), rate("USPS")]]) }
}

impl FakeShipping {
    pub fn with_responses(responses: Vec<Vec<Rate>>) -> Self {
        Self { responses, calls: AtomicUsize::new(0), labels: AtomicUsize::new(0), last_parcel: Mutex::new(None) }
    }
    pub fn shipment_calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
    pub fn label_calls(&self) -> usize { self.labels.load(Ordering::SeqCst) }
    pub fn last_parcel(&self) -> Option<Parcel> { *self.last_parcel.lock().unwrap() }
}

#[async_trait]
impl ShippingGateway for FakeShipping {
    async fn create_shipment(&self, _to: &Address, _from: &Address, parcel: &Parcel) -> Result<Shipment> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_parcel.lock().unwrap() = Some(*parcel);
        let rates = self.responses.get(n).or_else(|| self.responses.last()).cloned().unwrap_or_default();
        Ok(Shipment { id: format!("shp_{n}"), rates, messages: vec![] })
    }

    async fn buy_label(&self, shipment_id: &str, rate_id: &str) -> Result<PurchasedLabel> {
        self.labels.fetch_add(1, Ordering::SeqCst);
        Ok(PurchasedLabel {
            shipment_id: shipment_id.into(), tracking_code: format!("1Z{}", shipment_id.to_uppercase()), carrier: "UPS".into(),
            service: "Ground".into(), rate: Decimal::new(899, 2), label_url: format!("https://labels.test/{rate_id}.png"),
            tracking_url: Some("https://track.test/1".into()),
        })
    }

    async fn track(&self, tracking_code: &str, carrier: Option<&str>) -> Result<TrackingInfo> {
        Ok(TrackingInfo {
            tracking_code: tracking_code.into(), carrier: carrier.map(str::to_string), status: "in_transit".into(),
            public_url: None, est_delivery_date: None, details: vec![],
        })
    }
}
