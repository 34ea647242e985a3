use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::signature,
    services::orders::{CaptureOutcome, FailOutcome, OrderService},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use strum::EnumString;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

/// Event kinds the gateway delivers that this service acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
pub enum WebhookEventKind {
    #[strum(serialize = "payment.captured")]
    PaymentCaptured,
    #[strum(serialize = "payment.failed")]
    PaymentFailed,
}

/// Typed webhook envelope; nothing is deserialized until the body
/// signature has been verified.
#[derive(Debug, Deserialize)]
pub struct GatewayWebhookEvent {
    pub id: String,
    pub event: String,
    pub payload: GatewayWebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct GatewayWebhookPayload {
    pub gateway_order_id: String,
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// This delivery performed the transition
    Processed,
    /// The order was already terminal; replay acknowledged without side effects
    AlreadyProcessed,
    /// Unknown order or event kind; acknowledged so the gateway stops retrying
    Ignored,
}

/// Acknowledgment returned to the gateway once a delivery is handled.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

/// Webhook handler: the asynchronous, at-least-once reconciliation path.
/// Must converge with the client confirmation path, never double-apply.
#[derive(Clone)]
pub struct WebhookService {
    orders: Arc<OrderService>,
    webhook_secret: String,
    event_sender: Option<Arc<EventSender>>,
}

impl WebhookService {
    pub fn new(
        orders: Arc<OrderService>,
        webhook_secret: String,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            orders,
            webhook_secret,
            event_sender,
        }
    }

    async fn send_event(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send webhook event");
            }
        }
    }

    /// Processes one delivery: verify the body signature, parse, apply the
    /// state transition, acknowledge. Duplicate and out-of-order deliveries
    /// are side-effect-free.
    #[instrument(skip(self, body, signature_header))]
    pub async fn process(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookAck, ServiceError> {
        let supplied = signature_header.ok_or_else(|| {
            warn!("Webhook delivery without a signature header");
            ServiceError::SignatureError
        })?;

        if !signature::verify_webhook_signature(body, supplied, &self.webhook_secret) {
            // Public endpoint; treat as a potential spoofing attempt
            warn!("Webhook signature verification failed");
            return Err(ServiceError::SignatureError);
        }

        let event: GatewayWebhookEvent = serde_json::from_slice(body)
            .map_err(|e| ServiceError::ValidationError(format!("Malformed webhook body: {e}")))?;

        let kind = match WebhookEventKind::from_str(&event.event) {
            Ok(kind) => kind,
            Err(_) => {
                info!(event_id = %event.id, event = %event.event, "Unhandled webhook event kind");
                return Ok(WebhookAck {
                    received: true,
                    outcome: WebhookOutcome::Ignored,
                });
            }
        };

        let gateway_order_id = event.payload.gateway_order_id.as_str();
        let order = match self.orders.find_by_gateway_order_id(gateway_order_id).await? {
            Some(order) => order,
            None => {
                // Order expired or was removed after the event was queued;
                // acknowledge so the gateway's retry loop terminates
                warn!(
                    event_id = %event.id,
                    gateway_order_id,
                    "Webhook references an unknown order; acknowledging"
                );
                self.send_event(Event::WebhookIgnored {
                    gateway_order_id: gateway_order_id.to_string(),
                    event_kind: kind.to_string(),
                })
                .await;
                return Ok(WebhookAck {
                    received: true,
                    outcome: WebhookOutcome::Ignored,
                });
            }
        };

        let outcome = match kind {
            WebhookEventKind::PaymentCaptured => {
                let payment_id = event.payload.gateway_payment_id.as_deref().ok_or_else(|| {
                    ServiceError::ValidationError(
                        "payment.captured event without a gateway_payment_id".into(),
                    )
                })?;

                match self
                    .orders
                    .capture_order(order.id, payment_id, "webhook")
                    .await?
                {
                    CaptureOutcome::Captured => WebhookOutcome::Processed,
                    CaptureOutcome::AlreadyCaptured => WebhookOutcome::AlreadyProcessed,
                }
            }
            WebhookEventKind::PaymentFailed => {
                let reason = event
                    .payload
                    .reason
                    .as_deref()
                    .unwrap_or("payment failed at gateway");

                match self.orders.fail_order(order.id, reason, "webhook").await? {
                    FailOutcome::Failed => WebhookOutcome::Processed,
                    FailOutcome::AlreadyFailed => WebhookOutcome::AlreadyProcessed,
                    // Capture won the race; the stale failure is recorded
                    // but must not bounce the delivery
                    FailOutcome::AlreadyCaptured => WebhookOutcome::AlreadyProcessed,
                }
            }
        };

        info!(
            event_id = %event.id,
            order_id = %order.id,
            kind = %kind,
            ?outcome,
            "Webhook delivery handled"
        );

        Ok(WebhookAck {
            received: true,
            outcome,
        })
    }
}
