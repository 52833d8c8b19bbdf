//! Order settlement orchestrator.
//!
//! Drives the whole settlement saga: catalog resolution, pricing, coupon
//! claims, stock reservation, gateway intent creation, and the final
//! persistence transaction. Side effects are acquired in a fixed order
//! (coupons, then stock, then gateway) and unwound back to front when any
//! later step fails, so a rejected order leaves no trace.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::order::{
    self, Entity as Order, FulfillmentStatus, PaymentMethod, PaymentStatus,
};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::entities::order_status_history::{self, Entity as OrderStatusHistory};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::coupons::CouponService;
use crate::services::inventory::InventoryService;
use crate::services::notifications::{MerchantNotifier, NewOrderSummary};
use crate::services::payments::PaymentGateway;
use crate::services::pricing::{self, PricingQuote, ResolvedLineItem};

pub const MAX_COUPONS_PER_ORDER: usize = 2;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    #[validate]
    pub delivery_address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub coupon_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeliveryAddress {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 4, max = 10, message = "Pincode must be 4-10 characters"))]
    pub pincode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, message = "Gateway order id is required"))]
    pub gateway_order_id: String,
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub payment_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct QuoteRequest {
    #[validate(length(min = 1, message = "Quote must cover at least one item"))]
    pub items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub coupon_codes: Vec<String>,
}

/// Full order view: the aggregate row plus its line items and status trail.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub status_history: Vec<order_status_history::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderPage {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

pub struct OrderSettlementService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    coupons: CouponService,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn MerchantNotifier>,
    event_sender: Arc<EventSender>,
    currency: String,
    delivery_charge_minor: i64,
}

impl OrderSettlementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        coupons: CouponService,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn MerchantNotifier>,
        event_sender: Arc<EventSender>,
        currency: String,
        delivery_charge_minor: i64,
    ) -> Self {
        Self {
            db,
            inventory,
            coupons,
            gateway,
            notifier,
            event_sender,
            currency,
            delivery_charge_minor,
        }
    }

    /// Settles a new order end to end. Coupon claims are taken first, then
    /// stock, then (for online payment) the gateway intent, then the order
    /// row itself; each failure releases everything acquired before it.
    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        customer_name: &str,
        request: PlaceOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
        }

        let codes = normalize_coupon_codes(&request.coupon_codes)?;
        let lines = self.resolve_lines(&request.items).await?;
        let coupon_rows = self.coupons.find_by_codes(&codes).await?;
        let quote = pricing::resolve(&lines, &coupon_rows, self.delivery_charge_minor, Utc::now())?;

        // Acquisition order: coupons, stock, gateway. Unwind is the reverse.
        self.coupons.claim_all(&codes).await?;

        let requests: Vec<(Uuid, i32)> =
            lines.iter().map(|l| (l.product_id, l.quantity)).collect();
        let reservations = match self.inventory.reserve_all(&requests).await {
            Ok(r) => r,
            Err(err) => {
                self.release_claims(&codes).await;
                return Err(err);
            }
        };

        let order_number = generate_order_number();
        let gateway_order_id = match request.payment_method {
            PaymentMethod::Online => {
                match self
                    .gateway
                    .create_intent(quote.total_minor, &self.currency, &order_number)
                    .await
                {
                    Ok(intent) => Some(intent.gateway_order_id),
                    Err(err) => {
                        self.inventory.release_all(reservations).await;
                        self.release_claims(&codes).await;
                        return Err(err);
                    }
                }
            }
            PaymentMethod::Cod => None,
        };

        // Cash on delivery settles immediately; online orders await the
        // signature confirmation.
        let payment_status = match request.payment_method {
            PaymentMethod::Cod => PaymentStatus::Paid,
            PaymentMethod::Online => PaymentStatus::Pending,
        };

        let detail = match self
            .persist_order(
                customer_id,
                customer_name,
                &order_number,
                &lines,
                &codes,
                &request,
                &quote,
                payment_status,
                gateway_order_id,
            )
            .await
        {
            Ok(detail) => detail,
            Err(err) => {
                error!(error = %err, "Order persistence failed; unwinding settlement");
                self.inventory.release_all(reservations).await;
                self.release_claims(&codes).await;
                return Err(err);
            }
        };

        for reservation in reservations {
            self.inventory.commit(reservation);
        }

        info!(
            order_id = %detail.order.id,
            order_number = %detail.order.order_number,
            total_minor = detail.order.total_minor,
            "Order settled"
        );

        let _ = self
            .event_sender
            .send(Event::OrderPlaced {
                order_id: detail.order.id,
                customer_id,
                total_minor: detail.order.total_minor,
            })
            .await;

        let summary = NewOrderSummary {
            order_id: detail.order.id,
            order_number: detail.order.order_number.clone(),
            customer_name: detail.order.customer_name.clone(),
            total_minor: detail.order.total_minor,
            payment_method: detail.order.payment_method.clone(),
        };
        if let Err(err) = self.notifier.notify_new_order(&summary).await {
            warn!(order_id = %detail.order.id, error = %err, "Merchant notification failed");
        }

        Ok(detail)
    }

    /// Verifies the gateway's post-payment signature and finalizes the
    /// payment axis. Replays against a terminal order return it unchanged;
    /// COD orders are terminal from placement, so a stray verify call on
    /// one is absorbed the same way. The terminal guard is enforced in the
    /// UPDATE's WHERE clause, so concurrent confirmations cannot overwrite
    /// an already-settled outcome.
    #[instrument(skip(self, request))]
    pub async fn confirm_payment(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        request: ConfirmPaymentRequest,
    ) -> Result<order::Model, ServiceError> {
        request.validate()?;

        let existing = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if existing.customer_id != customer_id {
            return Err(ServiceError::Forbidden(
                "Order belongs to another customer".to_string(),
            ));
        }
        if existing.payment_status()?.is_terminal() {
            return Ok(existing);
        }
        match existing.gateway_order_id.as_deref() {
            Some(id) if id == request.gateway_order_id => {}
            _ => {
                return Err(ServiceError::ValidationError(
                    "Gateway order id does not match this order".to_string(),
                ))
            }
        }

        let verified = self.gateway.verify_signature(
            &request.gateway_order_id,
            &request.payment_id,
            &request.signature,
        );

        let new_status = if verified {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        };

        let mut update = Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(new_status.to_string()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            );
        if verified {
            update = update.col_expr(
                order::Column::GatewayPaymentId,
                Expr::value(Some(request.payment_id.clone())),
            );
        }
        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_string()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // A concurrent confirmation reached the terminal state first;
            // this delivery is a replay and is absorbed unchanged.
            return self.reload_order(order_id).await;
        }

        let updated = self.reload_order(order_id).await?;

        if verified {
            info!(%order_id, payment_id = %request.payment_id, "Payment verified");
            let _ = self
                .event_sender
                .send(Event::PaymentConfirmed {
                    order_id,
                    payment_id: request.payment_id,
                })
                .await;
            Ok(updated)
        } else {
            warn!(%order_id, "Payment signature mismatch");
            let _ = self.event_sender.send(Event::PaymentFailed { order_id }).await;
            Err(ServiceError::SignatureMismatch)
        }
    }

    /// Moves an order along the fulfillment axis. Terminal states accept
    /// no further transitions; everything else is merchant's choice. The
    /// terminal guard rides in the UPDATE's WHERE clause so two racing
    /// transitions cannot both move the order out of a terminal state.
    #[instrument(skip(self))]
    pub async fn transition_fulfillment(
        &self,
        order_id: Uuid,
        new_status: FulfillmentStatus,
    ) -> Result<order::Model, ServiceError> {
        let existing = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let current = existing.fulfillment_status()?;
        if current.is_terminal() {
            return Err(ServiceError::InvalidTransition {
                from: current.to_string(),
                to: new_status.to_string(),
            });
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let result = Order::update_many()
            .col_expr(
                order::Column::FulfillmentStatus,
                Expr::value(new_status.to_string()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::FulfillmentStatus.is_not_in([
                FulfillmentStatus::Delivered.to_string(),
                FulfillmentStatus::Cancelled.to_string(),
            ]))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            // The order reached a terminal status between the read and
            // the guarded update.
            txn.rollback().await?;
            let current = self.reload_order(order_id).await?;
            return Err(ServiceError::InvalidTransition {
                from: current.fulfillment_status,
                to: new_status.to_string(),
            });
        }

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(new_status.to_string()),
            changed_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let updated = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        txn.commit().await?;

        info!(%order_id, from = %current, to = %new_status, "Fulfillment status changed");
        let _ = self
            .event_sender
            .send(Event::OrderFulfillmentChanged {
                order_id,
                old_status: current.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        Ok(updated)
    }

    /// Dry-run settlement: same catalog resolution and pricing as a real
    /// order, but no claims, reservations, or persistence.
    pub async fn quote(&self, request: QuoteRequest) -> Result<PricingQuote, ServiceError> {
        request.validate()?;
        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
        }

        let codes = normalize_coupon_codes(&request.coupon_codes)?;
        let lines = self.resolve_lines(&request.items).await?;
        let coupon_rows = self.coupons.find_by_codes(&codes).await?;
        pricing::resolve(&lines, &coupon_rows, self.delivery_charge_minor, Utc::now())
    }

    pub async fn list_orders_for_customer(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let paginator = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Loads the full order view. When a customer id is given, orders that
    /// belong to someone else are indistinguishable from missing ones.
    pub async fn get_order(
        &self,
        customer_id: Option<Uuid>,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .filter(|o| customer_id.map_or(true, |c| o.customer_id == c))
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let status_history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::ChangedAt)
            .all(&*self.db)
            .await?;

        Ok(OrderDetail {
            order,
            items,
            status_history,
        })
    }

    pub async fn merchant_list(
        &self,
        status: Option<FulfillmentStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::FulfillmentStatus.eq(status.to_string()));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    async fn resolve_lines(
        &self,
        items: &[OrderItemRequest],
    ) -> Result<Vec<ResolvedLineItem>, ServiceError> {
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = self.inventory.load_products(&ids).await?;

        Ok(items
            .iter()
            .map(|item| {
                // load_products guarantees every requested id is present
                let product = products
                    .iter()
                    .find(|p| p.id == item.product_id)
                    .expect("product loaded");
                ResolvedLineItem {
                    product_id: product.id,
                    name: product.name.clone(),
                    price_minor: product.price_minor,
                    quantity: item.quantity,
                }
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_order(
        &self,
        customer_id: Uuid,
        customer_name: &str,
        order_number: &str,
        lines: &[ResolvedLineItem],
        codes: &[String],
        request: &PlaceOrderRequest,
        quote: &PricingQuote,
        payment_status: PaymentStatus,
        gateway_order_id: Option<String>,
    ) -> Result<OrderDetail, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let coupon_codes = if codes.is_empty() {
            None
        } else {
            Some(serde_json::to_string(codes).map_err(|e| {
                ServiceError::InternalError(format!("Failed to encode coupon codes: {}", e))
            })?)
        };
        let delivery_address =
            serde_json::to_string(&request.delivery_address).map_err(|e| {
                ServiceError::InternalError(format!("Failed to encode delivery address: {}", e))
            })?;

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.to_string()),
            customer_id: Set(customer_id),
            customer_name: Set(customer_name.to_string()),
            subtotal_minor: Set(quote.subtotal_minor),
            discount_minor: Set(quote.discount_minor),
            delivery_minor: Set(quote.delivery_minor),
            total_minor: Set(quote.total_minor),
            coupon_codes: Set(coupon_codes),
            delivery_address: Set(delivery_address),
            payment_method: Set(request.payment_method.to_string()),
            payment_status: Set(payment_status.to_string()),
            fulfillment_status: Set(FulfillmentStatus::Ordered.to_string()),
            gateway_order_id: Set(gateway_order_id),
            gateway_payment_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                price_minor: Set(line.price_minor),
                quantity: Set(line.quantity),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        let history = order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(FulfillmentStatus::Ordered.to_string()),
            changed_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(OrderDetail {
            order,
            items,
            status_history: vec![history],
        })
    }

    async fn reload_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn release_claims(&self, codes: &[String]) {
        let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        self.coupons.release_all(&refs).await;
    }
}

/// Uppercases, trims, and de-duplicates coupon codes, enforcing the
/// per-order cap on distinct codes.
pub fn normalize_coupon_codes(raw: &[String]) -> Result<Vec<String>, ServiceError> {
    let mut codes: Vec<String> = Vec::new();
    for code in raw {
        let normalized = code.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon codes must not be empty".to_string(),
            ));
        }
        if !codes.contains(&normalized) {
            codes.push(normalized);
        }
    }

    if codes.len() > MAX_COUPONS_PER_ORDER {
        return Err(ServiceError::ValidationError(format!(
            "At most {} coupons may be applied per order",
            MAX_COUPONS_PER_ORDER
        )));
    }

    Ok(codes)
}

fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        suffix[..6].to_uppercase()
    )
}
