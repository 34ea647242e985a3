use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront Order & Payment API

Order intake against the product catalog, hosted-gateway payment capture,
and server-to-server webhook reconciliation.

## Payment flow

1. `POST /api/v1/orders` validates the cart, prices it server-side, and
   returns a gateway order id for the hosted widget.
2. The buyer pays in the widget; the browser posts the confirmation to
   `POST /api/v1/orders/verify`.
3. The gateway delivers `payment.captured` / `payment.failed` events to
   `POST /api/v1/webhooks/gateway`, which converges with the confirmation
   path. Whichever arrives first captures the order; the other is a no-op.

Clients should re-fetch `GET /api/v1/orders/{id}` for final order status:
a failed synchronous confirmation may still be captured via webhook.

## Error Handling

Errors use a consistent JSON shape with appropriate HTTP status codes:

```json
{
  "error": "Conflict",
  "message": "Order already captured with a different payment id",
  "request_id": "req-abc123",
  "timestamp": "2025-11-09T00:00:00Z"
}
```
        "#,
        contact(
            name = "Storefront Engineering",
            email = "eng@storefront.example"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,

        // Payments
        crate::handlers::payments::verify_payment,

        // Webhooks
        crate::handlers::webhooks::gateway_webhook,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::errors::ErrorResponse,

            // Order types
            crate::entities::order::OrderStatus,
            crate::services::orders::BuyerInfo,
            crate::services::orders::OrderItemRequest,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderIntakeResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderResponse,

            // Payment types
            crate::services::payments::VerifyPaymentRequest,
            crate::services::payments::VerifyPaymentResponse,

            // Webhook types
            crate::services::webhooks::WebhookAck,
            crate::services::webhooks::WebhookOutcome,
        )
    ),
    tags(
        (name = "Orders", description = "Order intake and lookup"),
        (name = "Payments", description = "Client-side payment confirmation"),
        (name = "Webhooks", description = "Gateway server-to-server events")
    )
)]
pub struct ApiDoc;

/// Swagger UI router, served at /swagger-ui
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
