//! Best-effort domain event publication
//!
//! Downstream consumers (inventory, notifications) subscribe on
//! `commerce.orders.*`. Publication never fails the request path; a
//! broker outage is logged and the order flow continues.

use tracing::{debug, warn};

use crate::domain::events::OrderEvent;

#[derive(Clone)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats }
    }

    /// Publisher that drops every event; used by tests.
    pub fn disabled() -> Self {
        Self { nats: None }
    }

    pub async fn publish(&self, event: &OrderEvent) {
        let Some(client) = &self.nats else {
            return;
        };
        let subject = format!("commerce.orders.{}", event.kind());
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialize order event");
                return;
            }
        };
        match client.publish(subject.clone(), payload.into()).await {
            Ok(()) => debug!(%subject, "order event published"),
            Err(e) => warn!(%subject, error = %e, "failed to publish order event"),
        }
    }
}
