use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the order pipeline. Capture/failure events are
/// sent at most once per order, downstream of the state-machine CAS.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        amount_minor: i64,
    },
    OrderCaptured {
        order_id: Uuid,
        gateway_payment_id: String,
        /// "confirmation" or "webhook" - whichever path won the race
        source: &'static str,
    },
    OrderFailed {
        order_id: Uuid,
        reason: String,
    },
    DuplicateFinalization {
        order_id: Uuid,
        source: &'static str,
    },
    WebhookIgnored {
        gateway_order_id: String,
        event_kind: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer for domain events. Notification side effects live
/// here so they run exactly once per terminal transition.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        match event {
            Event::OrderCreated {
                order_id,
                amount_minor,
            } => {
                info!(%order_id, amount_minor, "Order created");
            }
            Event::OrderCaptured {
                order_id,
                ref gateway_payment_id,
                source,
            } => {
                info!(%order_id, %gateway_payment_id, source, "Order captured");
                // Buyer notification hook; queued here so retries and
                // duplicate deliveries can never re-trigger it
                info!(%order_id, "Order confirmation notification queued");
            }
            Event::OrderFailed {
                order_id,
                ref reason,
            } => {
                info!(%order_id, reason, "Order failed");
            }
            Event::DuplicateFinalization { order_id, source } => {
                warn!(%order_id, source, "Duplicate finalization attempt recorded");
            }
            Event::WebhookIgnored {
                ref gateway_order_id,
                ref event_kind,
            } => {
                warn!(%gateway_order_id, %event_kind, "Webhook event ignored");
            }
        }
    }
    info!("Event processor stopped");
}
