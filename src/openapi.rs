use utoipa::OpenApi;

use crate::entities::coupon::DiscountKind;
use crate::entities::order::{FulfillmentStatus, PaymentMethod, PaymentStatus};
use crate::entities::{order, order_item, order_status_history};
use crate::errors::ErrorResponse;
use crate::handlers;
use crate::services::orders::{
    ConfirmPaymentRequest, DeliveryAddress, OrderDetail, OrderItemRequest, OrderPage,
    PlaceOrderRequest, QuoteRequest,
};
use crate::services::pricing::PricingQuote;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::place_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::merchant_list_orders,
        handlers::orders::update_order_status,
        handlers::payments::verify_payment,
        handlers::coupons::validate_coupons,
    ),
    components(schemas(
        PlaceOrderRequest,
        OrderItemRequest,
        DeliveryAddress,
        ConfirmPaymentRequest,
        QuoteRequest,
        handlers::orders::UpdateStatusRequest,
        OrderDetail,
        OrderPage,
        PricingQuote,
        ErrorResponse,
        order::Model,
        order_item::Model,
        order_status_history::Model,
        FulfillmentStatus,
        PaymentStatus,
        PaymentMethod,
        DiscountKind,
    )),
    tags(
        (name = "orders", description = "Customer order settlement and history"),
        (name = "payments", description = "Online payment confirmation"),
        (name = "coupons", description = "Coupon validation and quoting"),
        (name = "merchant", description = "Merchant order management")
    ),
    info(
        title = "Storefront Settlement API",
        description = "Order settlement engine for a single-merchant storefront"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).expect("serializable");
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/coupons/validate"));
        assert!(json.contains("/api/v1/merchant/orders/{id}/status"));
    }
}
