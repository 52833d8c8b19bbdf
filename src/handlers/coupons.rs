use axum::{extract::State, routing::post, Json, Router};

use crate::errors::ServiceError;
use crate::services::orders::QuoteRequest;
use crate::services::pricing::PricingQuote;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Quote with coupons applied", body = PricingQuote),
        (status = 400, description = "Invalid, expired, or over-limit coupon"),
        (status = 409, description = "Coupon usage limit reached")
    ),
    tag = "coupons"
)]
pub async fn validate_coupons(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<PricingQuote>, ServiceError> {
    let quote = state.services.orders.quote(request).await?;
    Ok(Json(quote))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/validate", post(validate_coupons))
}
