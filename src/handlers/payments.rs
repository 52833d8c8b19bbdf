use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use uuid::Uuid;

use crate::auth::AuthenticatedCustomer;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::orders::ConfirmPaymentRequest;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment/verify",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed (or already terminal)"),
        (status = 400, description = "Signature mismatch or wrong gateway order"),
        (status = 403, description = "Order belongs to another customer"),
        (status = 404, description = "Order not found")
    ),
    tag = "payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    customer: AuthenticatedCustomer,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<order::Model>, ServiceError> {
    let updated = state
        .services
        .orders
        .confirm_payment(customer.id, id, request)
        .await?;
    Ok(Json(updated))
}

/// Nested under `/orders` alongside the customer order routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/{id}/payment/verify", post(verify_payment))
}
