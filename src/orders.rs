//! Order lookups, proofs and fulfillment updates.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::domain::aggregates::{Order, OrderItem};
use crate::notify::Notifier;
use crate::shipping::PurchasedLabel;
use crate::store::OrderStore;
use crate::{Result, ServiceError};

#[derive(Debug, Deserialize)] pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32> }
#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: i64, pub page: u32 }

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    bus: EventBus,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, notifier: Arc<dyn Notifier>, bus: EventBus) -> Self {
        Self { store, notifier, bus }
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.store.find_order(id).await?.ok_or_else(|| ServiceError::not_found(format!("order {id}")))
    }

    pub async fn list_orders(&self, params: &ListParams) -> Result<PaginatedResponse<Order>> {
        let page = params.page.unwrap_or(1).max(1);
        let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
        let offset = i64::from(page - 1) * i64::from(per_page);
        let (data, total) = self.store.list_orders(i64::from(per_page), offset).await?;
        Ok(PaginatedResponse { data, total, page })
    }

    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> { self.store.orders_for_user(user_id).await }

    pub async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        self.get_order(order_id).await?;
        self.store.order_items(order_id).await
    }

    /// Inserts a new order with its items, then publishes its events.
    /// Returns `false` when the order number is already taken.
    pub async fn create(&self, order: &mut Order, items: &[OrderItem]) -> Result<bool> {
        if !self.store.insert_order(order, items).await? {
            return Ok(false);
        }
        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_price, "order created");
        self.bus.publish_all(order.take_events()).await;
        Ok(true)
    }

    /// Saves the order, then publishes whatever events it raised.
    pub async fn persist(&self, order: &mut Order) -> Result<()> {
        self.store.save_order(order).await?;
        self.bus.publish_all(order.take_events()).await;
        Ok(())
    }

    /// Sends a staff notification; failures are logged and returned to the caller.
    pub async fn notify(&self, message: &str) -> Result<()> {
        self.notifier.notify(message).await.inspect_err(|e| warn!(error = %e, "notification failed"))
    }

    async fn update(&self, id: Uuid, change: impl FnOnce(&mut Order) -> Result<()>) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        change(&mut order)?;
        self.persist(&mut order).await?;
        Ok(order)
    }

    pub async fn cancel_order(&self, id: Uuid) -> Result<Order> {
        let order = self.update(id, |o| Ok(o.cancel()?)).await?;
        info!(order_id = %id, "order cancelled");
        Ok(order)
    }

    pub async fn add_proof(&self, id: Uuid, proof_url: &str, notes: Option<String>) -> Result<Order> {
        if proof_url.trim().is_empty() { return Err(ServiceError::invalid("Proof URL is required")); }
        self.update(id, |o| { o.add_proof(proof_url.trim(), notes)?; Ok(()) }).await
    }

    pub async fn send_proofs(&self, id: Uuid) -> Result<Order> {
        let order = self.update(id, |o| { o.send_proofs()?; Ok(()) }).await?;
        info!(order_id = %id, "proofs sent");
        Ok(order)
    }

    pub async fn approve_proof(&self, id: Uuid, proof_id: Uuid) -> Result<Order> {
        let mut all_approved = false;
        let order = self.update(id, |o| { all_approved = o.approve_proof(proof_id)?; Ok(()) }).await?;
        if all_approved {
            info!(order_id = %id, "all proofs approved, order ready for production");
            let _ = self.notify(&format!("✅ Proofs approved for order #{}: ready for production", order.order_number)).await;
        }
        Ok(order)
    }

    pub async fn request_proof_changes(&self, id: Uuid, proof_id: Uuid, customer_notes: Option<String>) -> Result<Order> {
        let order = self.update(id, |o| Ok(o.request_proof_changes(proof_id, customer_notes.clone())?)).await?;
        let notes = customer_notes.unwrap_or_else(|| "no notes".to_string());
        let _ = self.notify(&format!("✏️ Changes requested on order #{}: {}", order.order_number, notes)).await;
        Ok(order)
    }

    pub async fn replace_proof(&self, id: Uuid, proof_id: Uuid, proof_url: &str) -> Result<Order> {
        if proof_url.trim().is_empty() { return Err(ServiceError::invalid("Proof URL is required")); }
        self.update(id, |o| Ok(o.replace_proof(proof_id, proof_url.trim())?)).await
    }

    /// Manual tracking entry for shipments made outside the label flow.
    pub async fn update_tracking(&self, id: Uuid, tracking_number: &str, company: &str, url: Option<String>) -> Result<Order> {
        if tracking_number.trim().is_empty() || company.trim().is_empty() {
            return Err(ServiceError::invalid("Tracking number and company are required"));
        }
        let order = self.update(id, |o| Ok(o.ship(tracking_number.trim(), company.trim(), url)?)).await?;
        info!(order_id = %id, tracking_number = %tracking_number, "tracking updated");
        Ok(order)
    }

    /// Records a purchased label and marks the order shipped.
    pub async fn attach_label(&self, id: Uuid, label: &PurchasedLabel) -> Result<Order> {
        let order = self.update(id, |o| {
            o.ship(label.tracking_code.as_str(), label.carrier.as_str(), label.tracking_url.clone())?;
            o.shipment_id = Some(label.shipment_id.clone());
            o.label_url = Some(label.label_url.clone());
            Ok(())
        }).await?;
        info!(order_id = %id, tracking_number = %label.tracking_code, carrier = %label.carrier, "label attached");
        Ok(order)
    }

    /// Applies a carrier status to the order shipped under `tracking_number`.
    /// Returns `None` when no order carries that number.
    pub async fn apply_tracking_update(&self, tracking_number: &str, status: &str, public_url: Option<String>) -> Result<Option<Order>> {
        let Some(mut order) = self.store.find_order_by_tracking(tracking_number).await? else {
            return Ok(None);
        };
        order.apply_tracking_status(status, public_url);
        self.persist(&mut order).await?;
        info!(order_id = %order.id, tracking_number = %tracking_number, status = %status, "tracking status applied");
        Ok(Some(order))
    }
}
