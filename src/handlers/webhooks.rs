use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::webhooks::WebhookAck;
use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use bytes::Bytes;

/// Header carrying the gateway's HMAC over the raw request body
pub const GATEWAY_SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Receive a server-to-server payment event from the gateway
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/gateway",
    request_body = String,
    responses(
        (status = 200, description = "Event processed or already processed", body = WebhookAck),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid webhook signature", body = crate::errors::ErrorResponse),
        (status = 409, description = "Event conflicts with the captured order", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    // The signature covers the raw bytes, so the body is taken unparsed
    let signature = headers
        .get(GATEWAY_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state.services.webhooks.process(&body, signature).await?;
    Ok(Json(ack))
}

/// Webhook routes (no auth; signature-verified)
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/gateway", post(gateway_webhook))
}
