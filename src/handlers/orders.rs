use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthenticatedCustomer, MerchantAuth};
use crate::entities::order::FulfillmentStatus;
use crate::errors::ServiceError;
use crate::services::orders::{OrderDetail, OrderPage, PlaceOrderRequest};
use crate::AppState;

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MerchantListParams {
    pub status: Option<FulfillmentStatus>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: FulfillmentStatus,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order settled", body = OrderDetail),
        (status = 400, description = "Invalid request or coupon"),
        (status = 409, description = "Insufficient stock or coupon exhausted"),
        (status = 503, description = "Payment gateway unavailable")
    ),
    tag = "orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    customer: AuthenticatedCustomer,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .orders
        .place_order(customer.id, &customer.name, request)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListParams),
    responses((status = 200, description = "Customer's orders, newest first", body = OrderPage)),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    customer: AuthenticatedCustomer,
    Query(params): Query<ListParams>,
) -> Result<Json<OrderPage>, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders_for_customer(customer.id, params.page, params.per_page)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail", body = OrderDetail),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    customer: AuthenticatedCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetail>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_order(Some(customer.id), id)
        .await?;
    Ok(Json(detail))
}

#[utoipa::path(
    get,
    path = "/api/v1/merchant/orders",
    params(MerchantListParams),
    responses(
        (status = 200, description = "All orders, optionally filtered by status", body = OrderPage),
        (status = 401, description = "Missing merchant API key"),
        (status = 403, description = "Invalid merchant API key")
    ),
    tag = "merchant"
)]
pub async fn merchant_list_orders(
    State(state): State<AppState>,
    _auth: MerchantAuth,
    Query(params): Query<MerchantListParams>,
) -> Result<Json<OrderPage>, ServiceError> {
    let page = state
        .services
        .orders
        .merchant_list(params.status, params.page, params.per_page)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    put,
    path = "/api/v1/merchant/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated order"),
        (status = 400, description = "Order is in a terminal status"),
        (status = 404, description = "Order not found")
    ),
    tag = "merchant"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    _auth: MerchantAuth,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .orders
        .transition_fulfillment(id, request.status)
        .await?;
    Ok(Json(updated))
}

pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/{id}", get(get_order))
}

pub fn merchant_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(merchant_list_orders))
        .route("/{id}/status", put(update_order_status))
}
