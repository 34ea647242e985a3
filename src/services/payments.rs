use crate::{
    entities::order::OrderStatus, errors::ServiceError, gateway::signature,
    services::orders::OrderService,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Client-side confirmation payload produced by the hosted payment widget.
/// Exists only for the duration of a single verification call.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "gateway_order_id is required"))]
    pub gateway_order_id: String,
    #[validate(length(min = 1, message = "gateway_payment_id is required"))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1, message = "signature is required"))]
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub gateway_payment_id: String,
}

/// Payment confirmation handler: verifies the HMAC the gateway handed the
/// browser and finalizes the order through the shared capture path.
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<OrderService>,
    key_secret: String,
}

impl PaymentService {
    pub fn new(orders: Arc<OrderService>, key_secret: String) -> Self {
        Self { orders, key_secret }
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerifyPaymentResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let order = self
            .orders
            .find_model(request.order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", request.order_id))
            })?;

        // The stored gateway order id is authoritative; client input is
        // matched against it, never the other way around
        if order.gateway_order_id.as_deref() != Some(request.gateway_order_id.as_str()) {
            warn!(
                order_id = %order.id,
                "Payment confirmation carried a gateway order id that does not match the order"
            );
            return Err(ServiceError::Conflict(
                "Gateway order id does not match this order".into(),
            ));
        }

        if !signature::verify_payment_signature(
            &request.gateway_order_id,
            &request.gateway_payment_id,
            &request.signature,
            &self.key_secret,
        ) {
            // Potential tampering or replay; order state is left untouched
            warn!(
                order_id = %order.id,
                gateway_order_id = %request.gateway_order_id,
                "Payment signature verification failed"
            );
            return Err(ServiceError::SignatureError);
        }

        // Either this call performs the capture or a previous one already
        // did with the same payment id; both are success to the caller
        self.orders
            .capture_order(order.id, &request.gateway_payment_id, "confirmation")
            .await?;

        Ok(VerifyPaymentResponse {
            order_id: order.id,
            status: OrderStatus::Captured,
            gateway_payment_id: request.gateway_payment_id,
        })
    }
}
