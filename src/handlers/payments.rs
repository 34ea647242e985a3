use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::{VerifyPaymentRequest, VerifyPaymentResponse};
use crate::ApiResponse;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};

/// Verify a client-side payment confirmation and capture the order
#[utoipa::path(
    post,
    path = "/api/v1/orders/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified; order captured", body = crate::ApiResponse<VerifyPaymentResponse>),
        (status = 400, description = "Malformed confirmation", body = crate::errors::ErrorResponse),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 409, description = "Confirmation conflicts with stored order state", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<VerifyPaymentResponse>>, ServiceError> {
    let response = state.services.payments.verify_payment(request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Payment verification routes, nested under /orders
pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/verify", post(verify_payment))
}
