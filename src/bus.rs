//! Publishes domain events to NATS when a connection is configured.

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Drops every event; used when no broker is configured.
    pub fn disabled() -> Self { Self { nats: None } }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    /// Publishing is best effort: failures are logged, never returned.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else {
            for event in &events { debug!(subject = %event.subject(), "event bus disabled, dropping event"); }
            return;
        };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => { warn!(subject = %subject, error = %e, "failed to encode event"); continue; }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                warn!(subject = %subject, error = %e, "failed to publish event");
            }
        }
    }
}
