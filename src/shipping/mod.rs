//! Shipping: rates, labels and tracking through EasyPost.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Address, Order};
use crate::domain::value_objects::Parcel;
use crate::orders::OrderService;
use crate::{Result, ServiceError};

pub mod easypost;
pub mod monitor;

pub use easypost::EasyPostClient;
pub use monitor::RateMonitor;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rate { pub id: String, pub carrier: String, pub service: String, pub rate: Decimal, pub delivery_days: Option<i32> }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment { pub id: String, pub rates: Vec<Rate>, pub messages: Vec<String> }

impl Shipment {
    pub fn has_major_carrier(&self) -> bool {
        self.rates.iter().any(|r| {
            let carrier = r.carrier.to_ascii_uppercase();
            carrier.contains("UPS") || carrier.contains("FEDEX")
        })
    }

    fn needs_retry(&self) -> bool { self.rates.is_empty() || !self.has_major_carrier() }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedLabel {
    pub shipment_id: String,
    pub tracking_code: String,
    pub carrier: String,
    pub service: String,
    pub rate: Decimal,
    pub label_url: String,
    pub tracking_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingDetail { pub message: Option<String>, pub status: Option<String>, pub datetime: Option<String> }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingInfo {
    pub tracking_code: String,
    pub carrier: Option<String>,
    pub status: String,
    pub public_url: Option<String>,
    pub est_delivery_date: Option<String>,
    pub details: Vec<TrackingDetail>,
}

#[async_trait]
pub trait ShippingGateway: Send + Sync {
    async fn create_shipment(&self, to: &Address, from: &Address, parcel: &Parcel) -> Result<Shipment>;
    async fn buy_label(&self, shipment_id: &str, rate_id: &str) -> Result<PurchasedLabel>;
    async fn track(&self, tracking_code: &str, carrier: Option<&str>) -> Result<TrackingInfo>;
}

/// Delays double from `base_delay` on each retry.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy { pub max_retries: u32, pub base_delay: Duration }

impl Default for RetryPolicy {
    fn default() -> Self { Self { max_retries: 4, base_delay: Duration::from_secs(1) } }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration { self.base_delay * 2u32.saturating_pow(attempt) }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRequest {
    pub to_address: Address,
    pub from_address: Option<Address>,
    pub parcel: Parcel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingStatus { pub configured: bool, pub test_mode: bool, pub calls_last_minute: usize, pub warn_threshold: usize }

/// What a tracker webhook did.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerOutcome { pub received: bool, pub tracking_code: String, pub status: Option<String>, pub order_id: Option<Uuid> }

#[derive(Debug, Deserialize)]
struct TrackerEvent { description: String, result: TrackerResult }
#[derive(Debug, Deserialize)]
struct TrackerResult { tracking_code: String, status: Option<String>, public_url: Option<String> }

pub struct ShippingService {
    gateway: Option<Arc<dyn ShippingGateway>>,
    orders: Arc<OrderService>,
    ship_from: Option<Address>,
    test_mode: bool,
    retry: RetryPolicy,
    monitor: RateMonitor,
}

impl ShippingService {
    pub fn new(gateway: Option<Arc<dyn ShippingGateway>>, orders: Arc<OrderService>, ship_from: Option<Address>, test_mode: bool) -> Self {
        Self { gateway, orders, ship_from, test_mode, retry: RetryPolicy::default(), monitor: RateMonitor::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self { self.retry = retry; self }

    fn gateway(&self) -> Result<&Arc<dyn ShippingGateway>> {
        self.gateway.as_ref().ok_or(ServiceError::NotConfigured("EasyPost"))
    }

    pub fn status(&self) -> ShippingStatus {
        ShippingStatus {
            configured: self.gateway.is_some(),
            test_mode: self.test_mode,
            calls_last_minute: self.monitor.calls_in_window(),
            warn_threshold: self.monitor.warn_threshold(),
        }
    }

    /// Creates a shipment, retrying while carriers come back empty or without UPS/FedEx.
    #[instrument(skip(self, request))]
    pub async fn create_shipment(&self, request: ShipmentRequest) -> Result<Shipment> {
        let gateway = self.gateway()?;
        let from = request.from_address.or_else(|| self.ship_from.clone())
            .ok_or_else(|| ServiceError::invalid("No ship-from address configured"))?;
        request.to_address.validate()?;
        from.validate()?;
        if request.parcel.is_below_minimums() {
            info!(parcel = ?request.parcel, "parcel raised to carrier minimums");
        }
        let parcel = request.parcel.with_carrier_minimums();

        let mut best: Option<Shipment> = None;
        for attempt in 0..=self.retry.max_retries {
            self.monitor.record("create_shipment");
            let shipment = gateway.create_shipment(&request.to_address, &from, &parcel).await?;
            if !shipment.needs_retry() {
                info!(shipment_id = %shipment.id, rates = shipment.rates.len(), attempt, "shipment created");
                return Ok(shipment);
            }
            if best.as_ref().map_or(true, |b| shipment.rates.len() > b.rates.len()) {
                best = Some(shipment);
            }
            if attempt < self.retry.max_retries {
                let delay = self.retry.delay(attempt);
                warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "incomplete carrier rates, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        match best {
            Some(shipment) if !shipment.rates.is_empty() => {
                warn!(shipment_id = %shipment.id, rates = shipment.rates.len(), "returning shipment without UPS or FedEx rates");
                Ok(shipment)
            }
            _ => Err(ServiceError::UpstreamFailure("No shipping rates available".into())),
        }
    }

    pub async fn buy_label(&self, shipment_id: &str, rate_id: &str) -> Result<PurchasedLabel> {
        if shipment_id.trim().is_empty() || rate_id.trim().is_empty() {
            return Err(ServiceError::invalid("Shipment id and rate id are required"));
        }
        let gateway = self.gateway()?;
        self.monitor.record("buy_label");
        let label = gateway.buy_label(shipment_id, rate_id).await?;
        info!(shipment_id = %shipment_id, tracking_code = %label.tracking_code, "label purchased");
        Ok(label)
    }

    pub async fn buy_label_for_order(&self, order_id: Uuid, shipment_id: &str, rate_id: &str) -> Result<Order> {
        self.orders.get_order(order_id).await?.ensure_label_allowed()?;
        let label = self.buy_label(shipment_id, rate_id).await?;
        self.orders.attach_label(order_id, &label).await
    }

    pub async fn track(&self, tracking_code: &str, carrier: Option<&str>) -> Result<TrackingInfo> {
        let gateway = self.gateway()?;
        self.monitor.record("track");
        let info = gateway.track(tracking_code, carrier).await?;
        self.orders.apply_tracking_update(&info.tracking_code, &info.status, info.public_url.clone()).await?;
        Ok(info)
    }

    /// Handles an EasyPost `tracker.*` webhook body.
    pub async fn process_tracker_webhook(&self, payload: serde_json::Value) -> Result<TrackerOutcome> {
        let event: TrackerEvent = serde_json::from_value(payload)
            .map_err(|_| ServiceError::invalid("Invalid webhook payload"))?;
        let result = event.result;
        if !event.description.starts_with("tracker.") {
            info!(description = %event.description, "ignoring non-tracker EasyPost event");
            return Ok(TrackerOutcome { received: true, tracking_code: result.tracking_code, status: result.status, order_id: None });
        }
        let Some(status) = result.status.clone() else {
            return Ok(TrackerOutcome { received: true, tracking_code: result.tracking_code, status: None, order_id: None });
        };
        let order = self.orders.apply_tracking_update(&result.tracking_code, &status, result.public_url).await?;
        if order.is_none() {
            info!(tracking_code = %result.tracking_code, status = %status, "no order for tracking code");
        }
        Ok(TrackerOutcome { received: true, tracking_code: result.tracking_code, status: Some(status), order_id: order.map(|o| o.id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::domain::aggregates::{FulfillmentStatus, OrderStatus};
    use crate::store::{MemoryStore, OrderStore};
    use crate::test_utils::{rate, sample_address, sample_order, FakeShipping, RecordingNotifier};
    use serde_json::json;

    fn orders(store: Arc<MemoryStore>) -> Arc<OrderService> {
        Arc::new(OrderService::new(store, Arc::new(RecordingNotifier::default()), EventBus::disabled()))
    }

    fn service(fake: Arc<FakeShipping>, store: Arc<MemoryStore>) -> ShippingService {
        ShippingService::new(Some(fake), orders(store), Some(sample_address()), true)
            .with_retry_policy(RetryPolicy { max_retries: 4, base_delay: Duration::from_millis(1) })
    }

    fn request() -> ShipmentRequest {
        ShipmentRequest { to_address: sample_address(), from_address: None, parcel: Parcel::new(4.0, 3.0, 0.5, 3.0) }
    }

    #[tokio::test]
    async fn test_retries_until_major_carrier() {
        let fake = Arc::new(FakeShipping::with_responses(vec![
            vec![],
            vec![rate("USPS")],
            vec![rate("USPS"), rate("UPS")],
        ]));
        let svc = service(fake.clone(), Arc::new(MemoryStore::new()));
        let shipment = svc.create_shipment(request()).await.unwrap();
        assert!(shipment.has_major_carrier());
        assert_eq!(fake.shipment_calls(), 3);
        assert_eq!(fake.last_parcel(), Some(Parcel::new(8.0, 6.0, 2.0, 16.0)));
        assert_eq!(svc.status().calls_last_minute, 3);
    }

    #[tokio::test]
    async fn test_returns_best_after_exhausting_retries() {
        let fake = Arc::new(FakeShipping::with_responses(vec![vec![rate("USPS")]]));
        let svc = service(fake.clone(), Arc::new(MemoryStore::new()));
        let shipment = svc.create_shipment(request()).await.unwrap();
        assert_eq!(shipment.rates.len(), 1);
        assert_eq!(fake.shipment_calls(), 5);
    }

    #[tokio::test]
    async fn test_no_rates_is_upstream_failure() {
        let fake = Arc::new(FakeShipping::with_responses(vec![vec![]]));
        let svc = service(fake, Arc::new(MemoryStore::new()));
        assert!(matches!(svc.create_shipment(request()).await, Err(ServiceError::UpstreamFailure(_))));
    }

    #[tokio::test]
    async fn test_unconfigured() {
        let svc = ShippingService::new(None, orders(Arc::new(MemoryStore::new())), None, false);
        assert!(matches!(svc.create_shipment(request()).await, Err(ServiceError::NotConfigured(_))));
        assert!(!svc.status().configured);
    }

    #[tokio::test]
    async fn test_label_for_order_then_delivery_webhook() {
        let store = Arc::new(MemoryStore::new());
        let mut order = sample_order();
        order.mark_paid(Some("cs_1".into())).unwrap();
        store.insert_order(&order, &[]).await.unwrap();
        let svc = service(Arc::new(FakeShipping::default()), store);

        let shipped = svc.buy_label_for_order(order.id, "shp_1", "rate_1").await.unwrap();
        assert_eq!(shipped.order_status, OrderStatus::Shipped);
        assert_eq!(shipped.shipment_id.as_deref(), Some("shp_1"));
        let tracking = shipped.tracking_number.clone().unwrap();
        assert!(svc.buy_label_for_order(order.id, "shp_1", "rate_1").await.is_err());

        let outcome = svc.process_tracker_webhook(json!({
            "description": "tracker.updated",
            "result": { "tracking_code": tracking, "status": "delivered" }
        })).await.unwrap();
        assert_eq!(outcome.order_id, Some(order.id));
        let delivered = svc.orders.get_order(order.id).await.unwrap();
        assert_eq!(delivered.fulfillment_status, FulfillmentStatus::Delivered);
    }

    #[tokio::test]
    async fn test_no_label_for_unpaid_or_cancelled_order() {
        let store = Arc::new(MemoryStore::new());
        let unpaid = sample_order();
        let mut cancelled = Order { id: Uuid::now_v7(), order_number: "PS-1002".into(), ..sample_order() };
        cancelled.mark_paid(None).unwrap();
        cancelled.cancel().unwrap();
        store.insert_order(&unpaid, &[]).await.unwrap();
        store.insert_order(&cancelled, &[]).await.unwrap();
        let fake = Arc::new(FakeShipping::default());
        let svc = service(fake.clone(), store);

        assert!(matches!(svc.buy_label_for_order(unpaid.id, "shp_1", "rate_1").await, Err(ServiceError::ValidationFailed(_))));
        assert!(matches!(svc.buy_label_for_order(cancelled.id, "shp_2", "rate_2").await, Err(ServiceError::ValidationFailed(_))));
        assert_eq!(fake.label_calls(), 0);
        assert_eq!(svc.status().calls_last_minute, 0);
    }

    #[tokio::test]
    async fn test_malformed_webhook() {
        let svc = service(Arc::new(FakeShipping::default()), Arc::new(MemoryStore::new()));
        assert!(matches!(svc.process_tracker_webhook(json!({"result": {}})).await, Err(ServiceError::ValidationFailed(_))));
        let unknown = svc.process_tracker_webhook(json!({
            "description": "tracker.updated", "result": { "tracking_code": "NOPE", "status": "in_transit" }
        })).await.unwrap();
        assert!(unknown.order_id.is_none());
    }
}
